//! The two index structures produced by the instrumenting rewriter and
//! consumed by the debugger at runtime.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::id::CheckpointId;

/// Original position of the statement a checkpoint was inserted before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    /// 1-based line of the original statement, not the inserted call.
    pub line: u32,
    /// 1-based column of the original statement.
    pub column: u32,
}

/// `CheckpointMap` and `MethodCheckpointMap` for one rewritten unit.
///
/// Built once during the rewrite and immutable afterwards. Per-method id
/// lists are in allocation order, which equals the lexical order of the
/// statements in source, so they are strictly increasing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointIndex {
    locations: BTreeMap<CheckpointId, SourceLocation>,
    methods: BTreeMap<String, Vec<CheckpointId>>,
}

impl CheckpointIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a checkpoint. Panics in debug builds if the id was already
    /// recorded; the rewriter allocates each id exactly once.
    pub fn record(&mut self, id: CheckpointId, method: &str, location: SourceLocation) {
        let previous = self.locations.insert(id, location);
        debug_assert!(previous.is_none(), "checkpoint id {id} recorded twice");
        self.methods.entry(method.to_string()).or_default().push(id);
    }

    #[must_use]
    pub fn location(&self, id: CheckpointId) -> Option<&SourceLocation> {
        self.locations.get(&id)
    }

    #[must_use]
    pub fn method_checkpoints(&self, method: &str) -> Option<&[CheckpointId]> {
        self.methods.get(method).map(Vec::as_slice)
    }

    /// The next intra-method checkpoint after `current`, used by step-over.
    ///
    /// If `current` is present in the method's list, this is its successor;
    /// if absent, the first id strictly greater than `current`. `None` means
    /// `current` was the last statement of the method.
    #[must_use]
    pub fn next_in_method(&self, method: &str, current: CheckpointId) -> Option<CheckpointId> {
        let ids = self.methods.get(method)?;
        match ids.binary_search(&current) {
            Ok(idx) => ids.get(idx + 1).copied(),
            Err(idx) => ids.get(idx).copied(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CheckpointId, &SourceLocation)> {
        self.locations.iter().map(|(id, loc)| (*id, loc))
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, &[CheckpointId])> {
        self.methods
            .iter()
            .map(|(name, ids)| (name.as_str(), ids.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Resolves a `file:line` request to the nearest checkpoint.
    ///
    /// Candidate ids are those whose file path equals `file` exactly, else
    /// those whose file name equals `file`, else those whose path contains
    /// `file` as a substring. Among candidates the minimum `|line - target|`
    /// wins, ties broken by smallest id.
    #[must_use]
    pub fn resolve_line(&self, file: &str, line: u32) -> Option<CheckpointId> {
        let exact: Vec<_> = self
            .locations
            .iter()
            .filter(|(_, loc)| loc.file == file)
            .collect();
        let candidates = if !exact.is_empty() {
            exact
        } else {
            let by_basename: Vec<_> = self
                .locations
                .iter()
                .filter(|(_, loc)| {
                    Path::new(&loc.file)
                        .file_name()
                        .is_some_and(|name| name == file)
                })
                .collect();
            if !by_basename.is_empty() {
                by_basename
            } else {
                self.locations
                    .iter()
                    .filter(|(_, loc)| loc.file.contains(file))
                    .collect()
            }
        };

        // BTreeMap iteration is id-ascending, so `<` keeps the smallest id
        // among equal distances.
        candidates
            .into_iter()
            .min_by_key(|(id, loc)| (loc.line.abs_diff(line), **id))
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(file: &str, line: u32) -> SourceLocation {
        SourceLocation {
            file: file.to_string(),
            line,
            column: 5,
        }
    }

    fn id(raw: u32) -> CheckpointId {
        CheckpointId::from_raw(raw)
    }

    fn sample() -> CheckpointIndex {
        let mut index = CheckpointIndex::new();
        index.record(id(1), "demo.Main.run", loc("scripts/main.wp", 3));
        index.record(id(2), "demo.Main.run", loc("scripts/main.wp", 4));
        index.record(id(3), "demo.Main.run", loc("scripts/main.wp", 5));
        index.record(id(4), "demo.Util.helper", loc("scripts/util.wp", 3));
        index
    }

    #[test]
    fn next_in_method_walks_the_source_order_list() {
        let index = sample();
        assert_eq!(index.next_in_method("demo.Main.run", id(1)), Some(id(2)));
        assert_eq!(index.next_in_method("demo.Main.run", id(3)), None);
        assert_eq!(index.next_in_method("demo.Nope.run", id(1)), None);
    }

    #[test]
    fn next_in_method_skips_to_first_greater_when_current_absent() {
        let mut index = CheckpointIndex::new();
        index.record(id(2), "m", loc("a.wp", 1));
        index.record(id(6), "m", loc("a.wp", 2));
        assert_eq!(index.next_in_method("m", id(4)), Some(id(6)));
        assert_eq!(index.next_in_method("m", id(7)), None);
    }

    #[test]
    fn resolve_line_prefers_exact_path_then_basename_then_substring() {
        let index = sample();
        assert_eq!(index.resolve_line("scripts/util.wp", 10), Some(id(4)));
        assert_eq!(index.resolve_line("main.wp", 4), Some(id(2)));
        assert_eq!(index.resolve_line("util", 1), Some(id(4)));
        assert_eq!(index.resolve_line("missing.wp", 1), None);
    }

    #[test]
    fn resolve_line_breaks_distance_ties_by_smallest_id() {
        let index = sample();
        // Lines 3 and 5 are both distance 1 from 4... line 4 itself wins.
        assert_eq!(index.resolve_line("scripts/main.wp", 4), Some(id(2)));
        // Distance ties between ids 1 (line 3) and 3 (line 5) around 4 would
        // pick id 1; force the tie by asking between lines 3 and 4.
        let mut tied = CheckpointIndex::new();
        tied.record(id(7), "m", loc("t.wp", 2));
        tied.record(id(9), "m", loc("t.wp", 4));
        assert_eq!(tied.resolve_line("t.wp", 3), Some(id(7)));
    }
}
