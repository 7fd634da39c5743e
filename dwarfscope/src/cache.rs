// Copyright The Dwarfscope Authors
// SPDX-License-Identifier: Apache-2.0

//! Process-wide memoisation of per-file query results.
//!
//! The DWARF data of a given file is immutable, so everything derived from it
//! (compile-unit index, function listings, line tables) is computed once and
//! then shared. Entries are never invalidated; a process restart is the only
//! means of refresh.

use crate::{dwarf, lines, objfile};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, RwLock};

/// Concurrent insert-once map.
///
/// Safe under many readers and one writer: values are computed outside the
/// lock, so redundant computation is possible under contention, but the first
/// successfully inserted value wins and is the one every caller observes.
/// Errors are not cached.
pub(crate) struct Memo<K, V>(RwLock<HashMap<K, Arc<V>>>);

impl<K: Eq + Hash, V> Memo<K, V> {
    fn new() -> Self {
        Self(RwLock::new(HashMap::new()))
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<V>> {
        self.0.read().expect("cache lock poisoned").get(key).cloned()
    }

    pub(crate) fn get_or_try_insert_with<E>(
        &self,
        key: K,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let value = Arc::new(init()?);
        let mut map = self.0.write().expect("cache lock poisoned");
        Ok(map.entry(key).or_insert(value).clone())
    }

    /// Seeds an entry without computing, keeping an existing one if present.
    pub(crate) fn insert_if_absent(&self, key: K, value: Arc<V>) -> Arc<V> {
        let mut map = self.0.write().expect("cache lock poisoned");
        map.entry(key).or_insert(value).clone()
    }
}

/// All process-wide caches, grouped so that the key spaces stay visible in one
/// place: `path`, `(path, cu_offset)` and `(path, cu_offset, sp_offset)`.
pub(crate) struct Caches {
    pub(crate) objects: Memo<PathBuf, objfile::File>,
    pub(crate) dwarf: Memo<PathBuf, dwarf::Handle>,
    pub(crate) units: Memo<PathBuf, Vec<dwarf::CompileUnit>>,
    pub(crate) funcs: Memo<PathBuf, Vec<dwarf::Func>>,
    pub(crate) unit_funcs: Memo<(PathBuf, u64), Vec<dwarf::Func>>,
    pub(crate) subroutines: Memo<(PathBuf, u64, u64), Vec<dwarf::Func>>,
    pub(crate) line_files: Memo<(PathBuf, u64), Vec<String>>,
    pub(crate) line_tables: Memo<(PathBuf, u64), lines::LineTable>,
}

pub(crate) fn caches() -> &'static Caches {
    static CACHES: LazyLock<Caches> = LazyLock::new(|| Caches {
        objects: Memo::new(),
        dwarf: Memo::new(),
        units: Memo::new(),
        funcs: Memo::new(),
        unit_funcs: Memo::new(),
        subroutines: Memo::new(),
        line_files: Memo::new(),
        line_tables: Memo::new(),
    });

    &CACHES
}

/// Opens (or re-uses) the mapped object file for `path`.
pub(crate) fn object_for(path: &Path) -> objfile::Result<Arc<objfile::File>> {
    caches()
        .objects
        .get_or_try_insert_with(path.to_path_buf(), || objfile::File::load(path))
}
