//! Scene records and identities
//!
//! A [`SceneRecord`] is the caller-facing snapshot of one scene incarnation.
//! The registry owns the canonical state; records are copies and are never
//! updated after they are handed out.

use std::fmt;

use crate::foundation::collections::SceneKey;

/// Snapshot of a scene known to the registry
#[derive(Debug, Clone)]
pub struct SceneRecord {
    key: SceneKey,
    path: String,
    name: String,
    build_index: Option<usize>,
    loaded: bool,
    valid: bool,
}

impl SceneRecord {
    pub(crate) fn new(
        key: SceneKey,
        path: impl Into<String>,
        build_index: Option<usize>,
        loaded: bool,
    ) -> Self {
        let path = path.into();
        let name = scene_name_from_path(&path).to_string();
        Self {
            key,
            path,
            name,
            build_index,
            loaded,
            valid: true,
        }
    }

    /// Registry key of this incarnation
    pub fn key(&self) -> SceneKey {
        self.key
    }

    /// Unique scene path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Scene name: last path segment without extension
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the build list, if the scene is part of it
    pub fn build_index(&self) -> Option<usize> {
        self.build_index
    }

    /// Build index using `-1` for scenes outside the build list
    pub fn build_index_raw(&self) -> i64 {
        self.build_index
            .and_then(|index| i64::try_from(index).ok())
            .unwrap_or(-1)
    }

    /// Load state when the snapshot was taken
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Validity when the snapshot was taken
    ///
    /// Use [`SceneRegistry::is_valid`](crate::scene::SceneRegistry::is_valid)
    /// for the live answer.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn invalidated(mut self) -> Self {
        self.loaded = false;
        self.valid = false;
        self
    }
}

impl PartialEq for SceneRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.path == other.path
    }
}

impl Eq for SceneRecord {}

impl fmt::Display for SceneRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path)
    }
}

/// How a caller names a scene
///
/// Resolved once at the start of every registry operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SceneIdentity {
    /// Full scene path
    Path(String),
    /// Scene name; ties go to the first registered scene
    Name(String),
    /// Position in the build list
    BuildIndex(usize),
}

impl SceneIdentity {
    /// Identity by path
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    /// Identity by name
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

impl From<&SceneRecord> for SceneIdentity {
    fn from(record: &SceneRecord) -> Self {
        Self::Path(record.path.clone())
    }
}

impl From<usize> for SceneIdentity {
    fn from(index: usize) -> Self {
        Self::BuildIndex(index)
    }
}

impl fmt::Display for SceneIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "path '{path}'"),
            Self::Name(name) => write!(f, "name '{name}'"),
            Self::BuildIndex(index) => write!(f, "build index {index}"),
        }
    }
}

/// Derive a scene name from its path
///
/// Both `/` and `\` separate segments; only the last extension is stripped.
pub fn scene_name_from_path(path: &str) -> &str {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::HandleMap;

    #[test]
    fn test_scene_name_from_path() {
        assert_eq!(scene_name_from_path("scenes/levels/Forest.scene"), "Forest");
        assert_eq!(scene_name_from_path("Assets\\Scenes\\Menu.unity"), "Menu");
        assert_eq!(scene_name_from_path("Boot"), "Boot");
        assert_eq!(scene_name_from_path("scenes/archive.tar.scene"), "archive.tar");
        assert_eq!(scene_name_from_path("scenes/.hidden"), ".hidden");
    }

    #[test]
    fn test_record_equality_is_per_incarnation() {
        let mut keys: HandleMap<()> = HandleMap::with_key();
        let first = keys.insert(());
        let second = keys.insert(());

        let a = SceneRecord::new(first, "scenes/A.scene", None, false);
        let a_loaded = SceneRecord::new(first, "scenes/A.scene", None, true);
        let a_again = SceneRecord::new(second, "scenes/A.scene", None, false);

        assert_eq!(a, a_loaded);
        assert_ne!(a, a_again);
    }

    #[test]
    fn test_build_index_raw_sentinel() {
        let mut keys: HandleMap<()> = HandleMap::with_key();
        let key = keys.insert(());

        assert_eq!(SceneRecord::new(key, "a.scene", None, false).build_index_raw(), -1);
        assert_eq!(SceneRecord::new(key, "a.scene", Some(3), false).build_index_raw(), 3);
    }

    #[test]
    fn test_invalidated_record() {
        let mut keys: HandleMap<()> = HandleMap::with_key();
        let key = keys.insert(());
        let record = SceneRecord::new(key, "a.scene", None, true).invalidated();

        assert!(!record.is_valid());
        assert!(!record.is_loaded());
    }
}
