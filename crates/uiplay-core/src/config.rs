//! Data-root placeholder substitution for recorded file paths

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

pub const DATA_ROOT_ENV: &str = "UIPLAY_DATA_ROOT";
pub const DATA_ROOT_PLACEHOLDER: &str = "$DATA_ROOT";

/// Root directory substituted for `$DATA_ROOT` in recorded file paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRoot(String);

impl DataRoot {
    pub fn new(root: impl AsRef<str>) -> Self {
        Self(normalize_separators(root.as_ref().trim_end_matches(['/', '\\'])))
    }

    /// Read once per process: the environment variable, else the value
    /// baked in at compile time, else the working directory.
    pub fn from_env() -> Self {
        static ROOT: OnceLock<DataRoot> = OnceLock::new();
        ROOT.get_or_init(|| {
            let root = std::env::var(DATA_ROOT_ENV)
                .ok()
                .filter(|s| !s.is_empty())
                .or_else(|| option_env!("UIPLAY_DATA_ROOT").map(str::to_string))
                .unwrap_or_else(|| ".".to_string());
            DataRoot::new(root)
        })
        .clone()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Replace a leading placeholder, matched case-insensitively.
    pub fn expand(&self, path: &str) -> String {
        let path = normalize_separators(path);
        let n = DATA_ROOT_PLACEHOLDER.len();
        match path.get(..n) {
            Some(head) if head.eq_ignore_ascii_case(DATA_ROOT_PLACEHOLDER) => {
                format!("{}{}", self.0, &path[n..])
            }
            _ => path,
        }
    }

    /// Inverse of [`expand`](Self::expand): rewrite a path under the root
    /// to use the placeholder, so recordings stay portable.
    pub fn contract(&self, path: &str) -> String {
        let path = normalize_separators(path);
        let n = self.0.len();
        let under_root = n > 0
            && path.len() >= n
            && path.is_char_boundary(n)
            && path[..n].eq_ignore_ascii_case(&self.0)
            && (path.len() == n || path[n..].starts_with('/'));
        if under_root {
            format!("{}{}", DATA_ROOT_PLACEHOLDER, &path[n..])
        } else {
            path
        }
    }
}

impl Default for DataRoot {
    fn default() -> Self {
        Self::new(".")
    }
}

impl AsRef<Path> for DataRoot {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_case_insensitively() {
        let root = DataRoot::new("C:\\data\\");
        assert_eq!(root.as_str(), "C:/data");
        assert_eq!(root.expand("$data_root/cow.vtk"), "C:/data/cow.vtk");
        assert_eq!(root.expand("$DATA_ROOT\\sub\\a.png"), "C:/data/sub/a.png");
        assert_eq!(root.expand("/abs/file"), "/abs/file");
    }

    #[test]
    fn contract_is_inverse_for_paths_under_root() {
        let root = DataRoot::new("/srv/data");
        assert_eq!(root.contract("/SRV/data/x.csv"), "$DATA_ROOT/x.csv");
        assert_eq!(root.contract("/srv/database/x.csv"), "/srv/database/x.csv");
        assert_eq!(root.expand(&root.contract("/srv/data/x.csv")), "/srv/data/x.csv");
    }

    #[test]
    fn short_paths_are_untouched() {
        let root = DataRoot::new("/srv/data");
        assert_eq!(root.expand("$D"), "$D");
        assert_eq!(root.contract("/srv"), "/srv");
    }
}
