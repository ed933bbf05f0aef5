//! The `AppBundle` data model and inventory walk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::plist_codec::PlistDocument;

/// The kind of bundle, as distinguished by extension and `Info.plist` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    App,
    Extension,
    Framework,
    WatchApp,
    AppClip,
    Dylib,
    Plugin,
}

impl BundleKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "app" => Some(Self::App),
            "appex" => Some(Self::Extension),
            "framework" => Some(Self::Framework),
            "dylib" => Some(Self::Dylib),
            "plugin" => Some(Self::Plugin),
            _ => None,
        }
    }
}

/// A single bundle (app, extension, framework, ...) somewhere in the
/// archive's file tree.
#[derive(Debug, Clone)]
pub struct AppBundle {
    pub path: PathBuf,
    pub kind: BundleKind,
    pub original_bundle_id: String,
    pub display_name: String,
    pub executable_path: Option<PathBuf>,
    pub info_plist: PlistDocument,
    pub declared_entitlements: plist::Dictionary,
    pub nested: Vec<AppBundle>,
    pub is_watch_app: bool,
}

impl AppBundle {
    /// Load a single bundle's own metadata (not its descendants) from disk.
    fn load_self(path: &Path) -> Result<Self> {
        let info_plist_path = path.join("Info.plist");
        if !info_plist_path.is_file() {
            return Err(Error::MissingInfoPlist(path.to_path_buf()));
        }
        let info_plist = PlistDocument::read_file(&info_plist_path)?;

        let dict = info_plist
            .as_dictionary()
            .ok_or_else(|| Error::MissingInfoPlist(path.to_path_buf()))?;

        let bundle_id = dict
            .get("CFBundleIdentifier")
            .and_then(|v| v.as_string())
            .ok_or_else(|| Error::MissingBundleIdentifier(path.to_path_buf()))?
            .to_string();

        let display_name = dict
            .get("CFBundleDisplayName")
            .or_else(|| dict.get("CFBundleName"))
            .and_then(|v| v.as_string())
            .unwrap_or(&bundle_id)
            .to_string();

        let executable_name = dict
            .get("CFBundleExecutable")
            .and_then(|v| v.as_string())
            .map(|s| s.to_string());
        let executable_path = executable_name.map(|name| path.join(name));

        let is_watch_app = dict
            .get("WKWatchKitApp")
            .and_then(|v| v.as_boolean())
            .unwrap_or(false);

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let kind = if is_watch_app {
            BundleKind::WatchApp
        } else if dict
            .get("CFBundlePackageType")
            .and_then(|v| v.as_string())
            == Some("XPC!")
        {
            BundleKind::Plugin
        } else {
            BundleKind::from_extension(extension).unwrap_or(BundleKind::App)
        };

        let entitlements_path = path.join("Entitlements.plist");
        let declared_entitlements = if entitlements_path.is_file() {
            PlistDocument::read_file(&entitlements_path)?
                .as_dictionary()
                .cloned()
                .unwrap_or_default()
        } else {
            plist::Dictionary::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            original_bundle_id: bundle_id,
            display_name,
            executable_path,
            info_plist,
            declared_entitlements,
            nested: Vec::new(),
            is_watch_app,
        })
    }

    /// Root bundle ids paired with the original identifiers of every
    /// descendant, in depth-first order. Used by invariant checks that
    /// need the whole tree's identifiers without borrowing the tree.
    pub fn iter(&self) -> AppBundleIter<'_> {
        AppBundleIter { stack: vec![self] }
    }

    pub fn iter_mut_flat(&mut self) -> Vec<&mut AppBundle> {
        let mut out = Vec::new();
        fn walk<'a>(b: &'a mut AppBundle, out: &mut Vec<&'a mut AppBundle>) {
            for child in &mut b.nested {
                walk(child, out);
            }
            out.push(b);
        }
        walk(self, &mut out);
        out
    }

    pub fn write_info_plist(&self) -> Result<()> {
        self.info_plist.write_file(&self.path.join("Info.plist"))
    }
}

pub struct AppBundleIter<'a> {
    stack: Vec<&'a AppBundle>,
}

impl<'a> Iterator for AppBundleIter<'a> {
    type Item = &'a AppBundle;

    fn next(&mut self) -> Option<Self::Item> {
        let bundle = self.stack.pop()?;
        for child in &bundle.nested {
            self.stack.push(child);
        }
        Some(bundle)
    }
}

/// Directory names that may contain nested bundles, searched one level
/// below each bundle root.
const NESTED_SEARCH_DIRS: &[&str] = &[
    "PlugIns",
    "Frameworks",
    "Watch",
    "AppClips",
    "Extensions",
];

/// Depth-first walk of a `.app` root, building the full nested bundle tree.
/// Detects cycles via symlink resolution; a cycle is a fatal error.
pub fn build_inventory(app_root: &Path) -> Result<AppBundle> {
    let mut visited = HashSet::new();
    build_inventory_rec(app_root, &mut visited)
}

fn build_inventory_rec(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<AppBundle> {
    let canonical = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical.clone()) {
        return Err(Error::NestedBundleCycle(path.to_path_buf()));
    }

    let mut bundle = AppBundle::load_self(path)?;

    for search_dir in NESTED_SEARCH_DIRS {
        let dir = path.join(search_dir);
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let child_path = entry.path();
            let is_bundle_dir = child_path.is_dir()
                && child_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|ext| BundleKind::from_extension(ext).is_some())
                    .unwrap_or(false);
            if is_bundle_dir {
                let child = build_inventory_rec(child_path, visited)?;
                bundle.nested.push(child);
            }
        }
    }

    visited.remove(&canonical);
    Ok(bundle)
}

/// Locate the single top-level `.app` bundle inside an unpacked archive.
pub fn find_root_app(scratch_dir: &Path) -> Result<PathBuf> {
    for entry in WalkDir::new(scratch_dir).min_depth(1).max_depth(4) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.path().extension().and_then(|e| e.to_str()) == Some("app") {
            return Ok(entry.path().to_path_buf());
        }
    }
    Err(Error::NoAppBundle(scratch_dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_app(dir: &Path, bundle_id: &str, name: &str) {
        fs::create_dir_all(dir).unwrap();
        let plist = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>{bundle_id}</string>
	<key>CFBundleExecutable</key>
	<string>{name}</string>
</dict>
</plist>
"#
        );
        fs::write(dir.join("Info.plist"), plist).unwrap();
        fs::write(dir.join(name), b"fake-macho").unwrap();
    }

    #[test]
    fn builds_nested_inventory() {
        let tmp = tempfile::tempdir().unwrap();
        let app = tmp.path().join("Hello.app");
        write_app(&app, "com.example.hello", "Hello");

        let ext = app.join("PlugIns").join("Share.appex");
        write_app(&ext, "com.example.hello.share", "Share");

        let bundle = build_inventory(&app).unwrap();
        assert_eq!(bundle.original_bundle_id, "com.example.hello");
        assert_eq!(bundle.nested.len(), 1);
        assert_eq!(bundle.nested[0].original_bundle_id, "com.example.hello.share");
        assert_eq!(bundle.nested[0].kind, BundleKind::Extension);
    }

    #[test]
    fn finds_root_app() {
        let tmp = tempfile::tempdir().unwrap();
        let payload = tmp.path().join("Payload");
        let app = payload.join("Hello.app");
        write_app(&app, "com.example.hello", "Hello");

        let found = find_root_app(tmp.path()).unwrap();
        assert_eq!(found, app);
    }
}
