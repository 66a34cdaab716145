use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::error::DemoError;
use crate::net::atoi;
use crate::protocol::{
    DEMO_EXT, DEMO_PROTOCOLS, MAX_DEMO_NAME_ATTEMPTS, NEW_PROTOCOL_VERSION, PROTOCOL_VERSION,
};

pub fn append_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub fn demo_file_name(base: &Path, protocol: i32) -> PathBuf {
    append_suffix(base, &format!(".{}{}", DEMO_EXT, protocol))
}

/// Recording base path without extension, and whether the name was explicit.
pub fn record_base<Tz: TimeZone>(
    demo_dir: &Path,
    explicit: Option<&str>,
    now: &DateTime<Tz>,
) -> (PathBuf, bool)
where
    Tz::Offset: std::fmt::Display,
{
    match explicit {
        Some(name) => (demo_dir.join(strip_record_extension(name)), true),
        None => {
            let stamp = now.format("demo-%Y%m%d-%H%M%S").to_string();
            (demo_dir.join(stamp), false)
        }
    }
}

fn strip_record_extension(name: &str) -> &str {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return name;
    };
    let known = [PROTOCOL_VERSION, NEW_PROTOCOL_VERSION]
        .iter()
        .any(|p| ext.eq_ignore_ascii_case(&format!("{}{}", DEMO_EXT, p)));
    if known { stem } else { name }
}

/// First free final name for a finished recording. Explicit names are reused
/// as is. `None` once every numbered candidate is taken.
pub fn final_record_path(base: &Path, protocol: i32, explicit: bool) -> Option<PathBuf> {
    let mut path = demo_file_name(base, protocol);
    if explicit {
        return Some(path);
    }

    let mut sequence = 0;
    while path.exists() {
        sequence += 1;
        if sequence >= MAX_DEMO_NAME_ATTEMPTS {
            return None;
        }
        path = demo_file_name(&append_suffix(base, &format!("-{:02}", sequence)), protocol);
    }
    Some(path)
}

/// Opens a demo for playback. Returns the file, its path and protocol.
pub fn open_demo(demo_dir: &Path, arg: &str) -> Result<(File, PathBuf, i32), DemoError> {
    if let Some((stem, ext)) = arg.rsplit_once('.') {
        let is_demo_ext = ext
            .get(..DEMO_EXT.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(DEMO_EXT));
        if is_demo_ext {
            let protocol = atoi(&ext[DEMO_EXT.len()..]);
            if DEMO_PROTOCOLS.contains(&protocol) {
                let path = demo_dir.join(arg);
                return match File::open(&path) {
                    Ok(file) => Ok((file, path, protocol)),
                    Err(_) => Err(DemoError::NotFound(path.display().to_string())),
                };
            }
            log::info!("Protocol {} not supported for demos", protocol);
            return walk_demo_ext(demo_dir, stem);
        }
    }
    walk_demo_ext(demo_dir, arg)
}

fn walk_demo_ext(demo_dir: &Path, arg: &str) -> Result<(File, PathBuf, i32), DemoError> {
    let mut last = demo_dir.join(arg);
    for protocol in DEMO_PROTOCOLS {
        let path = demo_file_name(&demo_dir.join(arg), protocol);
        match File::open(&path) {
            Ok(file) => {
                log::info!("Demo file: {}", path.display());
                return Ok((file, path, protocol));
            }
            Err(_) => log::info!("Not found: {}", path.display()),
        }
        last = path;
    }
    Err(DemoError::NotFound(last.display().to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::demo::tests::scratch_dir;

    #[test]
    fn explicit_names_lose_known_extensions() {
        let dir = Path::new("demos");
        let now = Utc::now();
        assert_eq!(record_base(dir, Some("duel.DM_68"), &now).0, dir.join("duel"));
        assert_eq!(record_base(dir, Some("duel.dm_71"), &now).0, dir.join("duel"));
        assert_eq!(record_base(dir, Some("duel.dm_66"), &now).0, dir.join("duel.dm_66"));
        assert!(record_base(dir, Some("duel"), &now).1);
    }

    #[test]
    fn timestamp_name() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        let (path, explicit) = record_base(Path::new("demos"), None, &now);
        assert_eq!(path, Path::new("demos/demo-20240309-070502"));
        assert!(!explicit);
    }

    #[test]
    fn collisions_get_numbered_suffixes() {
        let dir = scratch_dir("names-collide");
        let base = dir.join("demo");
        std::fs::write(demo_file_name(&base, 68), b"").unwrap();
        std::fs::write(dir.join("demo-01.dm_68"), b"").unwrap();

        assert_eq!(
            final_record_path(&base, 68, false).unwrap(),
            dir.join("demo-02.dm_68")
        );
        assert_eq!(final_record_path(&base, 68, true).unwrap(), dir.join("demo.dm_68"));
        assert_eq!(final_record_path(&base, 71, false).unwrap(), dir.join("demo.dm_71"));
    }

    #[test]
    fn playback_walks_protocols_newest_first() {
        let dir = scratch_dir("names-walk");
        std::fs::write(dir.join("match.dm_67"), b"x").unwrap();
        std::fs::write(dir.join("match.dm_68"), b"x").unwrap();

        let (_, path, protocol) = open_demo(&dir, "match").unwrap();
        assert_eq!(protocol, 68);
        assert_eq!(path, dir.join("match.dm_68"));

        let (_, _, protocol) = open_demo(&dir, "match.dm_67").unwrap();
        assert_eq!(protocol, 67);
    }

    #[test]
    fn unsupported_extension_retries_without_it() {
        let dir = scratch_dir("names-retry");
        std::fs::write(dir.join("old.dm_66"), b"x").unwrap();

        let (_, path, protocol) = open_demo(&dir, "old.dm_90").unwrap();
        assert_eq!(protocol, 66);
        assert_eq!(path, dir.join("old.dm_66"));
    }

    #[test]
    fn missing_demo_is_not_found() {
        let dir = scratch_dir("names-missing");
        assert!(matches!(open_demo(&dir, "nothing"), Err(DemoError::NotFound(_))));
        assert!(matches!(open_demo(&dir, "nothing.dm_68"), Err(DemoError::NotFound(_))));
    }
}
