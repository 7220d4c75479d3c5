//! Structural contracts for the values in [`crate::model`].

use steps::Contract;

/// `{ url: <absolute URL> }`
pub fn trigger() -> Contract {
    Contract::object([("url", Contract::Url)])
}

pub fn file_delta() -> Contract {
    Contract::object([
        ("filename", Contract::NonEmptyString),
        ("status", Contract::String),
        ("additions", Contract::Integer),
        ("deletions", Contract::Integer),
        ("changes", Contract::Integer),
    ])
}

pub fn changeset() -> Contract {
    Contract::object([
        (
            "reference",
            Contract::object([
                ("owner", Contract::NonEmptyString),
                ("repo", Contract::NonEmptyString),
                ("number", Contract::Integer),
            ]),
        ),
        ("url", Contract::Url),
        ("title", Contract::String),
        ("description", Contract::nullable(Contract::String)),
        ("base_sha", Contract::String),
        ("head_sha", Contract::String),
        ("changed_files", Contract::array(file_delta())),
        ("unified_diff", Contract::String),
    ])
}

/// `{ text: <non-empty string> }`
pub fn review() -> Contract {
    Contract::object([("text", Contract::NonEmptyString)])
}

pub fn report() -> Contract {
    Contract::object([("location", Contract::NonEmptyString)])
}
