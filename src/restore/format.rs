// restoretool/src/restore/format.rs
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::errors::RestoreError;
use crate::restore::DumpSource;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const CUSTOM_MAGIC: &[u8; 5] = b"PGDMP";
// "ustar" lives at offset 257 of the first tar header block
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8; 5] = b"ustar";
const SNIFF_LEN: usize = 512;

/// Dump layouts pg_dump can produce. Plain variants restore through psql,
/// the rest through pg_restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Plain,
    PlainCompressed,
    Custom,
    Tar,
    Directory,
}

/// Which executor a format selects. Every format maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Archive,
    Script,
}

impl DumpFormat {
    pub fn strategy(&self) -> Strategy {
        match self {
            DumpFormat::Plain | DumpFormat::PlainCompressed => Strategy::Script,
            DumpFormat::Custom | DumpFormat::Tar | DumpFormat::Directory => Strategy::Archive,
        }
    }

    /// Name of the client tool this format restores through.
    pub fn tool_name(&self) -> &'static str {
        match self.strategy() {
            Strategy::Archive => "pg_restore",
            Strategy::Script => "psql",
        }
    }

    /// Value for pg_restore's --format flag; None for script formats.
    pub fn archive_hint(&self) -> Option<&'static str> {
        match self {
            DumpFormat::Custom => Some("custom"),
            DumpFormat::Tar => Some("tar"),
            DumpFormat::Directory => Some("directory"),
            DumpFormat::Plain | DumpFormat::PlainCompressed => None,
        }
    }
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DumpFormat::Plain => "plain",
            DumpFormat::PlainCompressed => "plain-compressed",
            DumpFormat::Custom => "custom",
            DumpFormat::Tar => "tar",
            DumpFormat::Directory => "directory",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DumpFormat {
    type Err = RestoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "sql" | "p" => Ok(DumpFormat::Plain),
            "plain-compressed" | "gzip" | "gz" => Ok(DumpFormat::PlainCompressed),
            "custom" | "c" => Ok(DumpFormat::Custom),
            "tar" | "t" => Ok(DumpFormat::Tar),
            "directory" | "dir" | "d" => Ok(DumpFormat::Directory),
            other => Err(RestoreError::UnrecognizedFormat(other.to_string())),
        }
    }
}

/// Classifies the dump source. An explicit override always wins; files are
/// sniffed by leading bytes, then by extension, and fall back to plain.
/// Stdin cannot be sniffed without consuming the stream, so it defaults to
/// plain unless overridden.
pub fn detect_format(
    source: &DumpSource,
    explicit: Option<DumpFormat>,
) -> Result<DumpFormat, RestoreError> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    let path = match source {
        DumpSource::Stdin => return Ok(DumpFormat::Plain),
        DumpSource::File(path) => path,
    };
    if path.is_dir() {
        return Ok(DumpFormat::Directory);
    }
    let header = read_header(path)?;
    if let Some(format) = sniff(&header) {
        return Ok(format);
    }
    Ok(from_extension(path).unwrap_or(DumpFormat::Plain))
}

/// Matches known magic bytes in the first block of the dump. Works on a
/// bounded prefix so stream inputs never need to be fully resident.
pub fn sniff(header: &[u8]) -> Option<DumpFormat> {
    if header.starts_with(&GZIP_MAGIC) {
        return Some(DumpFormat::PlainCompressed);
    }
    if header.starts_with(CUSTOM_MAGIC) {
        return Some(DumpFormat::Custom);
    }
    if header.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
    {
        return Some(DumpFormat::Tar);
    }
    None
}

pub fn from_extension(path: &Path) -> Option<DumpFormat> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "sql" => Some(DumpFormat::Plain),
        "gz" => Some(DumpFormat::PlainCompressed),
        "dump" | "custom" => Some(DumpFormat::Custom),
        "tar" => Some(DumpFormat::Tar),
        _ => None,
    }
}

fn read_header(path: &Path) -> Result<Vec<u8>, RestoreError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RestoreError::InputNotFound(path.to_path_buf()),
        _ => RestoreError::Io(e),
    })?;
    let mut buf = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RestoreError::Io(e)),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_fixture(dir: &TempDir, name: &str, contents: &[u8]) -> anyhow::Result<PathBuf> {
        let path = dir.path().join(name);
        let mut file = File::create(&path)?;
        file.write_all(contents)?;
        Ok(path)
    }

    fn tar_header() -> Vec<u8> {
        let mut block = vec![0u8; 512];
        block[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5].copy_from_slice(TAR_MAGIC);
        block
    }

    #[test]
    fn every_format_maps_to_exactly_one_strategy() {
        let all = [
            DumpFormat::Plain,
            DumpFormat::PlainCompressed,
            DumpFormat::Custom,
            DumpFormat::Tar,
            DumpFormat::Directory,
        ];
        for format in all {
            match format {
                DumpFormat::Plain | DumpFormat::PlainCompressed => {
                    assert_eq!(format.strategy(), Strategy::Script);
                    assert_eq!(format.tool_name(), "psql");
                    assert!(format.archive_hint().is_none());
                }
                _ => {
                    assert_eq!(format.strategy(), Strategy::Archive);
                    assert_eq!(format.tool_name(), "pg_restore");
                    assert!(format.archive_hint().is_some());
                }
            }
        }
    }

    #[test]
    fn magic_bytes_beat_extensions() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        // a .sql file that actually holds a custom-format dump
        let path = write_fixture(&dir, "mislabelled.sql", b"PGDMP\x01\x0e\x00")?;
        let format = detect_format(&DumpSource::File(path), None)?;
        assert_eq!(format, DumpFormat::Custom);
        Ok(())
    }

    #[test]
    fn gzip_and_tar_magic_are_recognized() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let gz = write_fixture(&dir, "dump.bin", &[0x1f, 0x8b, 0x08, 0x00])?;
        assert_eq!(
            detect_format(&DumpSource::File(gz), None)?,
            DumpFormat::PlainCompressed
        );
        let tar = write_fixture(&dir, "dump.bin2", &tar_header())?;
        assert_eq!(detect_format(&DumpSource::File(tar), None)?, DumpFormat::Tar);
        Ok(())
    }

    #[test]
    fn extensions_decide_when_no_magic_matches() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        for (name, expected) in [
            ("a.sql", DumpFormat::Plain),
            ("a.sql.gz", DumpFormat::PlainCompressed),
            ("a.dump", DumpFormat::Custom),
            ("a.custom", DumpFormat::Custom),
            ("a.tar", DumpFormat::Tar),
        ] {
            let path = write_fixture(&dir, name, b"-- not a magic header\n")?;
            assert_eq!(detect_format(&DumpSource::File(path), None)?, expected, "{name}");
        }
        Ok(())
    }

    #[test]
    fn unknown_content_defaults_to_plain() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_fixture(&dir, "nondescript", b"SELECT 1;\n")?;
        assert_eq!(detect_format(&DumpSource::File(path), None)?, DumpFormat::Plain);
        Ok(())
    }

    #[test]
    fn directories_are_directory_format() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let format = detect_format(&DumpSource::File(dir.path().to_path_buf()), None)?;
        assert_eq!(format, DumpFormat::Directory);
        Ok(())
    }

    #[test]
    fn explicit_override_wins_regardless_of_content() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_fixture(&dir, "really-custom.dump", b"PGDMP\x01")?;
        let format = detect_format(&DumpSource::File(path), Some(DumpFormat::Plain))?;
        assert_eq!(format, DumpFormat::Plain);
        Ok(())
    }

    #[test]
    fn stdin_defaults_to_plain_and_honors_override() -> anyhow::Result<()> {
        assert_eq!(detect_format(&DumpSource::Stdin, None)?, DumpFormat::Plain);
        assert_eq!(
            detect_format(&DumpSource::Stdin, Some(DumpFormat::Custom))?,
            DumpFormat::Custom
        );
        Ok(())
    }

    #[test]
    fn format_strings_round_trip_and_reject_garbage() {
        assert_eq!("plain".parse::<DumpFormat>().unwrap(), DumpFormat::Plain);
        assert_eq!(
            "plain-compressed".parse::<DumpFormat>().unwrap(),
            DumpFormat::PlainCompressed
        );
        assert_eq!("dir".parse::<DumpFormat>().unwrap(), DumpFormat::Directory);
        let err = "zip".parse::<DumpFormat>().unwrap_err();
        assert!(matches!(err, RestoreError::UnrecognizedFormat(s) if s == "zip"));
    }

    #[test]
    fn short_files_do_not_trip_the_tar_check() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = write_fixture(&dir, "tiny", b"hi")?;
        assert_eq!(detect_format(&DumpSource::File(path), None)?, DumpFormat::Plain);
        Ok(())
    }
}
