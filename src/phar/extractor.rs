use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::io::{ReadAt, StreamError};
use anyhow::{Context, Result, bail};
use tracing::debug;

use super::archive::Archive;
use super::options::ParseOptions;
use super::structures::Entry;

/// PHAR file extractor
pub struct PharExtractor<R: ReadAt + ?Sized> {
    archive: Archive<R>,
}

impl<R: ReadAt + ?Sized> PharExtractor<R> {
    /// Parse the archive behind `reader`, verifying it unless `verify` is off.
    pub fn new(reader: Arc<R>, options: &ParseOptions, verify: bool) -> Result<Self> {
        let archive = if verify {
            Archive::parse_with(reader, options)
        } else {
            Archive::parse_unverified(reader, options)
        }
        .context("cannot parse archive")?;
        Ok(Self { archive })
    }

    pub fn archive(&self) -> &Archive<R> {
        &self.archive
    }

    /// List all files in the archive
    pub fn list_files(&self) -> &[Entry] {
        self.archive.entries()
    }

    /// Extract file data to memory
    pub fn extract_to_memory(&self, entry: &Entry) -> Result<Vec<u8>> {
        self.archive
            .read(entry)
            .with_context(|| format!("cannot extract {}", entry.name))
    }

    /// Extract file to disk
    pub fn extract_to_file(&self, entry: &Entry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
        }

        if entry.is_directory {
            fs::create_dir_all(output_path)
                .with_context(|| format!("cannot create {}", output_path.display()))?;
            return Ok(());
        }

        let mut file = fs::File::create(output_path)
            .with_context(|| format!("cannot create {}", output_path.display()))?;
        self.copy_entry(entry, &mut file)?;
        set_permissions(output_path, entry.permissions())?;

        debug!(name = %entry.name, path = %output_path.display(), "extracted");
        Ok(())
    }

    /// Extract file to stdout
    pub fn extract_to_stdout(&self, entry: &Entry) -> Result<()> {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        self.copy_entry(entry, &mut stdout)?;
        stdout.flush()?;
        Ok(())
    }

    fn copy_entry(&self, entry: &Entry, out: &mut impl Write) -> Result<()> {
        let limit = entry.uncompressed_size as u64;
        let reader = self
            .archive
            .open(entry)
            .with_context(|| format!("cannot extract {}", entry.name))?;
        let copied = io::copy(&mut reader.take(limit), out)
            .map_err(|e| StreamError::classify(e).into_inner())
            .with_context(|| format!("cannot extract {}", entry.name))?;
        if copied != limit {
            bail!(
                "cannot extract {}: expected {} bytes, got {}",
                entry.name,
                limit,
                copied
            );
        }
        Ok(())
    }
}

/// Path an entry extracts to under `dir`.
///
/// Entry names are cleaned when decoded, but may still be absolute or climb
/// out with `..`; those are refused.
pub fn output_path(dir: &Path, name: &str, junk_paths: bool) -> Result<PathBuf> {
    let relative = Path::new(name);
    if junk_paths {
        return match relative.file_name() {
            Some(file_name) => Ok(dir.join(file_name)),
            None => bail!("refusing to extract {name}: no file name"),
        };
    }

    let mut path = dir.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("refusing to extract {name}: path leaves the output directory")
            }
        }
    }
    Ok(path)
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if mode != 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("cannot set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
