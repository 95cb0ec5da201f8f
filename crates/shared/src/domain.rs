use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(PostId);
id_newtype!(CommentId);
id_newtype!(UserId);

/// Closed set of community post categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostCategory {
    Analysis,
    News,
    Discussion,
    Strategy,
    Education,
}

impl PostCategory {
    pub const ALL: [PostCategory; 5] = [
        PostCategory::Analysis,
        PostCategory::News,
        PostCategory::Discussion,
        PostCategory::Strategy,
        PostCategory::Education,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PostCategory::Analysis => "ANALYSIS",
            PostCategory::News => "NEWS",
            PostCategory::Discussion => "DISCUSSION",
            PostCategory::Strategy => "STRATEGY",
            PostCategory::Education => "EDUCATION",
        }
    }
}

impl fmt::Display for PostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        PostCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown post category '{trimmed}'"))
    }
}
