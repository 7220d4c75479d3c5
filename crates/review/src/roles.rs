//! Review roles and the viewpoint each one takes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One reviewer's point of view.
///
/// [`Role::ALL`] is also the order in which reviews appear in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Summary,
    Architecture,
    CodeQuality,
    Performance,
    Security,
    Testing,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Summary,
        Role::Architecture,
        Role::CodeQuality,
        Role::Performance,
        Role::Security,
        Role::Testing,
    ];

    /// Id of the step that produces this role's review.
    pub fn step_id(self) -> &'static str {
        match self {
            Role::Summary => "review_summary",
            Role::Architecture => "review_architecture",
            Role::CodeQuality => "review_code_quality",
            Role::Performance => "review_performance",
            Role::Security => "review_security",
            Role::Testing => "review_testing",
        }
    }

    /// Heading of this role's section in the report.
    pub fn title(self) -> &'static str {
        match self {
            Role::Summary => "Summary",
            Role::Architecture => "Architecture and modularity",
            Role::CodeQuality => "Code quality and readability",
            Role::Performance => "Performance and efficiency",
            Role::Security => "Security",
            Role::Testing => "Testing and toolchain",
        }
    }

    /// Full instructions handed to the review generator.
    pub fn instructions(self) -> String {
        let format = match self {
            Role::Summary => SUMMARY_FORMAT.to_owned(),
            _ => output_format(self.title()),
        };
        format!("{BASIC}\n{}\n{format}", self.criteria())
    }

    fn criteria(self) -> &'static str {
        match self {
            Role::Summary => SUMMARY,
            Role::Architecture => ARCHITECTURE,
            Role::CodeQuality => CODE_QUALITY,
            Role::Performance => PERFORMANCE,
            Role::Security => SECURITY,
            Role::Testing => TESTING,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Summary => "summary",
            Role::Architecture => "architecture",
            Role::CodeQuality => "code_quality",
            Role::Performance => "performance",
            Role::Security => "security",
            Role::Testing => "testing",
        };
        f.write_str(name)
    }
}

/// Org-mode skeleton every analysis role answers in.
pub fn output_format(title: &str) -> String {
    format!(
        "# Output format (org)\n\
         \n\
         Answer in the following org structure. Wrap prose so it reads well.\n\
         \n\
         ```org\n\
         * {title}\n\
         ** Comments\n\
         \n\
         [Overall assessment of the change from this viewpoint]\n\
         \n\
         ** Findings\n\
         \n\
         [Concrete issues, each with file, location and severity]\n\
         \n\
         ** Structural concerns and suggestions\n\
         \n\
         [Root causes and practical improvements]\n\
         ```\n"
    )
}

const BASIC: &str = "\
# Role

You are a senior engineer reviewing a GitHub pull request. You receive the
pull request metadata, the list of changed files and the unified diff.
Base every statement on the material provided and say so when the diff is
not enough to decide.
";

const SUMMARY_FORMAT: &str = "\
# Output format (org)

```org
* Summary
** Purpose of the pull request

[What the change does and why, based on the description and the diff]

** Changed files

[A table of file name, lines added and removed, and what changed]
```
";

const SUMMARY: &str = "\
# Task

Summarize the intent of this pull request.
";

const ARCHITECTURE: &str = "\
# Task

Review the pull request for architecture and separation of responsibilities.

## Criteria

1. Single responsibility: each type and function serves one concern.
2. Coupling: dependencies between modules are minimal and point at abstractions.
3. Layering: no layer reaches past its neighbours.
4. Extensibility: the structure absorbs likely future changes.
5. Cycles: the change introduces no circular module dependencies.

Point out responsibilities outside this pull request that should be split as well.
";

const CODE_QUALITY: &str = "\
# Task

Review the pull request for code quality and readability.

## Criteria

1. Naming: names state intent and match the surrounding code.
2. Structure: functions are short, flat and free of duplicated logic.
3. Error handling: failures are propagated or reported, never silently dropped.
4. Idiom: the code uses the language and its libraries the way they are meant to be used.
5. Comments: they explain constraints that the code cannot express.
";

const PERFORMANCE: &str = "\
# Task

Review the pull request for performance and resource efficiency.

## Criteria

1. Algorithmic cost: no accidental quadratic work on realistic input sizes.
2. I/O: network and disk calls are batched, bounded and not repeated needlessly.
3. Memory: no unnecessary copies, unbounded buffers or leaks.
4. Concurrency: blocking work stays off async executors and locks are held briefly.
5. Hot paths: allocations and logging on frequently executed paths are justified.
";

const SECURITY: &str = "\
# Task

Review the pull request for security and safety.

## Criteria

1. Input validation: external input is validated and sanitized.
2. Authentication and authorization: new code paths enforce access checks.
3. Sessions and tokens: credentials and CSRF protections are handled safely.
4. External dependencies: file access, command execution and library use are controlled.
5. Logging: no secrets such as tokens or passwords reach the logs.
6. Cryptography: algorithms and key management are appropriate.

Name the matching OWASP Top 10 category when a finding has one. Report
suspected risks even when they cannot be confirmed from the diff.
";

const TESTING: &str = "\
# Task

Review the pull request for testing and CI/CD consistency.

## Criteria

1. Relevance: the change comes with tests at the right level.
2. Coverage: normal, error and boundary cases are exercised.
3. Stability: no signs of flaky, time or environment dependent tests.
4. Pipeline: CI configuration changes are intentional and keep the build reproducible.
5. Operations: the change does not add manual steps to the release process.
";
