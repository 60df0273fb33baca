//! Scope classification of a hit relative to the query target.

use std::fmt;

use serde::Serialize;

use crate::types::IndexedFile;

/// How far a caller sits from the target it reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Same file
    Local,
    /// Different file, same module
    Module,
    /// Different module
    Global,
}

impl Scope {
    /// Classify `caller` relative to `target`.
    #[must_use]
    pub fn classify(target: &IndexedFile, caller: &IndexedFile) -> Self {
        if target.path == caller.path {
            Self::Local
        } else if target.module == caller.module {
            Self::Module
        } else {
            Self::Global
        }
    }

    /// Upper-case label used in reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Module => "MODULE",
            Self::Global => "GLOBAL",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleRule;
    use crate::types::FileId;
    use rstest::rstest;
    use std::path::PathBuf;

    fn file(path: &str) -> IndexedFile {
        IndexedFile {
            id: FileId::from(1),
            path: PathBuf::from(path),
            module: ModuleRule::default().module_for(path),
            is_critical: false,
            content_hash: None,
            indexed_at: 0,
        }
    }

    #[rstest]
    #[case("a/b.c", Scope::Local)]
    #[case("a/x.c", Scope::Module)]
    #[case("z/y.c", Scope::Global)]
    #[case("src/a/deep/q.c", Scope::Module)]
    #[case("main.c", Scope::Global)]
    fn classifies_relative_to_target(#[case] caller: &str, #[case] expected: Scope) {
        assert_eq!(Scope::classify(&file("a/b.c"), &file(caller)), expected);
    }

    #[test]
    fn root_module_files_share_a_module() {
        assert_eq!(Scope::classify(&file("main.c"), &file("util.c")), Scope::Module);
    }
}
