//! Merging ordered policy files into one view.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ParseError;
use crate::policy::PolicyEntry;
use crate::view::PolicyView;

/// Turns one policy file into its entries.
pub trait PolicyParser: Send + Sync {
    /// Parses the file at `path`.
    ///
    /// # Errors
    /// Returns `ParseError` if the file cannot be read or is malformed.
    fn parse(&self, path: &Path) -> Result<Vec<PolicyEntry>, ParseError>;
}

impl<P: PolicyParser + ?Sized> PolicyParser for Box<P> {
    fn parse(&self, path: &Path) -> Result<Vec<PolicyEntry>, ParseError> {
        (**self).parse(path)
    }
}

/// Merges files with last-writer-wins precedence.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine<P> {
    parser: P,
}

impl<P: PolicyParser> MergeEngine<P> {
    /// Engine reading files with `parser`.
    #[must_use]
    pub fn new(parser: P) -> Self {
        Self { parser }
    }

    /// Parses `files` in order and merges them.
    ///
    /// A later file overrides an earlier one key by key, without moving the
    /// key in the enumeration order. Files that fail to parse are skipped.
    #[must_use]
    pub fn merge(&self, files: &[PathBuf]) -> PolicyView {
        let mut view = PolicyView::new();

        for file in files {
            let entries = match self.parser.parse(file) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping unparsable policy file");
                    continue;
                }
            };

            debug!(file = %file.display(), entries = entries.len(), "merging policy file");
            for entry in entries {
                view.insert(entry);
            }
        }

        view
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::value::PolicyValue;

    /// Parser backed by a fixed table; unknown paths are malformed.
    struct TableParser(HashMap<PathBuf, Vec<PolicyEntry>>);

    impl PolicyParser for TableParser {
        fn parse(&self, path: &Path) -> Result<Vec<PolicyEntry>, ParseError> {
            self.0.get(path).cloned().ok_or(ParseError::BadSignature)
        }
    }

    fn e(name: &str, v: u32) -> PolicyEntry {
        PolicyEntry::new("Software\\Policies\\Test", name, PolicyValue::Dword(v))
    }

    fn engine() -> MergeEngine<TableParser> {
        let mut table = HashMap::new();
        table.insert(PathBuf::from("f1.pol"), vec![e("A", 1)]);
        table.insert(PathBuf::from("f2.pol"), vec![e("A", 2), e("B", 1)]);
        table.insert(PathBuf::from("f3.pol"), vec![e("C", 3)]);
        MergeEngine::new(TableParser(table))
    }

    #[test]
    fn later_file_wins_and_keeps_position() {
        let view = engine().merge(&[PathBuf::from("f1.pol"), PathBuf::from("f2.pol")]);
        let got: Vec<_> = view.iter().map(|x| (x.value_name.clone(), x.value.clone())).collect();
        assert_eq!(
            got,
            vec![
                ("A".to_string(), PolicyValue::Dword(2)),
                ("B".to_string(), PolicyValue::Dword(1)),
            ]
        );
    }

    #[test]
    fn malformed_file_is_skipped() {
        let view = engine().merge(&[
            PathBuf::from("f1.pol"),
            PathBuf::from("broken.pol"),
            PathBuf::from("f3.pol"),
        ]);
        let names: Vec<_> = view.iter().map(|x| x.value_name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[test]
    fn empty_input_is_empty_view() {
        assert!(engine().merge(&[]).is_empty());
    }

    #[test]
    fn reversed_order_flips_winner() {
        let view = engine().merge(&[PathBuf::from("f2.pol"), PathBuf::from("f1.pol")]);
        assert_eq!(view.get("software\\policies\\test", "a").unwrap().value, PolicyValue::Dword(1));
    }
}
