//! APK Archive Inspection
//!
//! Reads entry names and launcher icons out of an installed package's archive.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zip::ZipArchive;

use crate::PackageError;

/// Upper bound on the up-front buffer for an icon entry; declared sizes are not trusted
const MAX_ICON_PREALLOC: usize = 1 << 20;

/// Framework an application was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltWith {
    Native,
    Flutter,
    ReactNative,
    Unknown,
}

impl BuiltWith {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltWith::Native => "native",
            BuiltWith::Flutter => "flutter",
            BuiltWith::ReactNative => "react_native",
            BuiltWith::Unknown => "unknown",
        }
    }

    /// Caller-supplied override. Anything unrecognised, including `""`, means "detect".
    pub fn parse_override(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "native" => Some(BuiltWith::Native),
            "flutter" => Some(BuiltWith::Flutter),
            "react_native" | "reactnative" => Some(BuiltWith::ReactNative),
            _ => None,
        }
    }

    /// Classify an archive by the names it contains
    pub fn detect<S: AsRef<str>>(entries: &[S]) -> Self {
        let names: Vec<&str> = entries.iter().map(|e| e.as_ref()).collect();

        if names
            .iter()
            .any(|n| n.contains("flutter_assets/") || n.ends_with("/libflutter.so"))
        {
            return BuiltWith::Flutter;
        }

        if names.iter().any(|n| {
            n.ends_with("/libreactnativejni.so")
                || n.ends_with("/libhermes.so")
                || *n == "assets/index.android.bundle"
        }) {
            return BuiltWith::ReactNative;
        }

        BuiltWith::Native
    }
}

/// Buffer capacity for an entry that claims `declared` bytes
fn prealloc_hint(declared: u64) -> usize {
    usize::try_from(declared).unwrap_or(usize::MAX).min(MAX_ICON_PREALLOC)
}

fn open(path: &Path) -> Result<ZipArchive<File>, PackageError> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| PackageError::Archive(format!("{}: {}", path.display(), e)))
}

/// All entry names of the archive at `path`
pub fn entry_names(path: &Path) -> Result<Vec<String>, PackageError> {
    let archive = open(path)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

fn density_rank(qualifiers: &str) -> u8 {
    for qualifier in qualifiers.split('-') {
        let rank = match qualifier {
            "ldpi" => 1,
            "mdpi" => 2,
            "tvdpi" => 3,
            "hdpi" => 4,
            "xhdpi" => 5,
            "xxhdpi" => 6,
            "xxxhdpi" => 7,
            _ => continue,
        };
        return rank;
    }
    0
}

/// Ordering key of a candidate icon entry, `None` if it is not one
fn icon_rank(name: &str) -> Option<(bool, bool, u8)> {
    let rest = name.strip_prefix("res/")?;
    let (dir, file) = rest.split_once('/')?;
    let stem = file.strip_suffix(".png")?;
    if !stem.starts_with("ic_launcher") {
        return None;
    }

    let (kind, qualifiers) = dir.split_once('-').unwrap_or((dir, ""));
    let is_mipmap = match kind {
        "mipmap" => true,
        "drawable" => false,
        _ => return None,
    };

    Some((is_mipmap, stem == "ic_launcher", density_rank(qualifiers)))
}

/// Highest-density launcher icon of the archive, re-encoded as PNG.
///
/// `Ok(None)` when the archive carries no recognisable icon (for example when
/// resource names were obfuscated at build time).
pub fn launcher_icon(path: &Path) -> Result<Option<Vec<u8>>, PackageError> {
    let mut archive = open(path)?;

    let best = archive
        .file_names()
        .filter_map(|name| icon_rank(name).map(|rank| (rank, name.to_string())))
        .max_by_key(|(rank, _)| *rank)
        .map(|(_, name)| name);

    let Some(name) = best else {
        debug!("No launcher icon in {:?}", path);
        return Ok(None);
    };

    let mut entry = archive
        .by_name(&name)
        .map_err(|e| PackageError::Archive(format!("{}: {}", name, e)))?;
    let mut raw = Vec::with_capacity(prealloc_hint(entry.size()));
    entry.read_to_end(&mut raw)?;

    reencode_png(&raw).map(Some)
}

/// Decode any supported image and write it back as PNG
pub fn reencode_png(raw: &[u8]) -> Result<Vec<u8>, PackageError> {
    let image = image::load_from_memory(raw).map_err(|e| PackageError::Archive(e.to_string()))?;

    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .map_err(|e| PackageError::Archive(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    pub(crate) fn tiny_png(size: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(size, size, image::Rgba([200, 30, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    pub(crate) fn write_apk(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_detect_platform() {
        assert_eq!(
            BuiltWith::detect(&["assets/flutter_assets/AssetManifest.json"]),
            BuiltWith::Flutter
        );
        assert_eq!(BuiltWith::detect(&["lib/arm64-v8a/libflutter.so"]), BuiltWith::Flutter);
        assert_eq!(
            BuiltWith::detect(&["lib/arm64-v8a/libreactnativejni.so", "classes.dex"]),
            BuiltWith::ReactNative
        );
        assert_eq!(BuiltWith::detect(&["assets/index.android.bundle"]), BuiltWith::ReactNative);
        assert_eq!(BuiltWith::detect(&["classes.dex", "AndroidManifest.xml"]), BuiltWith::Native);
        assert_eq!(BuiltWith::detect::<&str>(&[]), BuiltWith::Native);
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(BuiltWith::parse_override("flutter"), Some(BuiltWith::Flutter));
        assert_eq!(BuiltWith::parse_override("REACT_NATIVE"), Some(BuiltWith::ReactNative));
        assert_eq!(BuiltWith::parse_override("native"), Some(BuiltWith::Native));
        assert_eq!(BuiltWith::parse_override(""), None);
        assert_eq!(BuiltWith::parse_override("xamarin"), None);
    }

    #[test]
    fn test_icon_rank() {
        assert_eq!(icon_rank("res/mipmap-xxxhdpi-v4/ic_launcher.png"), Some((true, true, 7)));
        assert_eq!(icon_rank("res/drawable-hdpi/ic_launcher_round.png"), Some((false, false, 4)));
        assert_eq!(icon_rank("res/mipmap-anydpi-v26/ic_launcher.xml"), None);
        assert_eq!(icon_rank("res/layout/ic_launcher.png"), None);
        assert_eq!(icon_rank("assets/ic_launcher.png"), None);
    }

    #[test]
    fn test_declared_size_does_not_drive_allocation() {
        assert_eq!(prealloc_hint(512), 512);
        assert_eq!(prealloc_hint(u64::MAX), MAX_ICON_PREALLOC);
        assert_eq!(prealloc_hint(0xFFFF_FFF0), MAX_ICON_PREALLOC);
    }

    #[test]
    fn test_entry_names_and_icon() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("base.apk");
        let small = tiny_png(4);
        let large = tiny_png(16);
        write_apk(
            &apk,
            &[
                ("AndroidManifest.xml", b"<manifest/>"),
                ("res/mipmap-mdpi/ic_launcher.png", &small),
                ("res/mipmap-xxhdpi/ic_launcher.png", &large),
                ("res/mipmap-xxxhdpi/ic_launcher_foreground.png", &small),
            ],
        );

        let names = entry_names(&apk).unwrap();
        assert_eq!(names.len(), 4);

        let icon = launcher_icon(&apk).unwrap().unwrap();
        let decoded = image::load_from_memory(&icon).unwrap();
        assert_eq!(decoded.width(), 16);
    }

    #[test]
    fn test_missing_icon_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("base.apk");
        write_apk(&apk, &[("classes.dex", b"dex\n035")]);

        assert_eq!(launcher_icon(&apk).unwrap(), None);
    }

    #[test]
    fn test_not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, b"not a zip").unwrap();

        assert!(matches!(entry_names(&path), Err(PackageError::Archive(_))));
    }
}
