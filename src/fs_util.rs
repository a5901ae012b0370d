use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::error::KiraError;
use crate::plan::ArchiveFormat;

/// One regular file produced by decompression, named by its path inside the
/// archive with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMember {
    pub name: String,
    pub path: PathBuf,
}

/// Unpacks `archive_path` into `target_dir`. `file_name` names the output of
/// a plain gzip stream. Members of zip and tar archives ending in `.gz` or
/// `.gzip` are decompressed as well and listed without that suffix.
pub fn decompress(
    archive_path: &Path,
    format: ArchiveFormat,
    file_name: &str,
    target_dir: &Path,
) -> Result<Vec<ExtractedMember>, KiraError> {
    fs::create_dir_all(target_dir).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut members = match format {
        ArchiveFormat::Gzip => {
            let name = strip_gzip_suffix(file_name).unwrap_or(file_name).to_string();
            let path = target_dir.join(&name);
            gunzip(archive_path, &path)?;
            return Ok(vec![ExtractedMember { name, path }]);
        }
        ArchiveFormat::Zip => extract_zip(archive_path, target_dir)?,
        ArchiveFormat::TarBz2 => extract_tar_bz2(archive_path, target_dir)?,
    };

    for member in &mut members {
        if let Some(stripped) = strip_gzip_suffix(&member.name) {
            let stripped = stripped.to_string();
            let path = target_dir.join(&stripped);
            gunzip(&member.path, &path)?;
            fs::remove_file(&member.path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
            debug!(member = %member.name, "decompressed nested gzip member");
            member.name = stripped;
            member.path = path;
        }
    }
    members.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(members)
}

fn strip_gzip_suffix(name: &str) -> Option<&str> {
    name.strip_suffix(".gzip")
        .or_else(|| name.strip_suffix(".gz"))
        .filter(|stripped| !stripped.is_empty())
}

fn gunzip(source: &Path, destination: &Path) -> Result<(), KiraError> {
    let file = fs::File::open(source)
        .map_err(|err| KiraError::Filesystem(format!("open gzip {}: {err}", source.display())))?;
    let mut decoder = MultiGzDecoder::new(io::BufReader::new(file));
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    let mut outfile =
        fs::File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, &mut outfile)
        .map_err(|err| KiraError::Archive(format!("gzip {}: {err}", source.display())))?;
    Ok(())
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<Vec<ExtractedMember>, KiraError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| KiraError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| KiraError::Archive(err.to_string()))?;

    let mut members = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| KiraError::Archive(err.to_string()))?;
        let relative = match entry.enclosed_name() {
            Some(path) => path,
            None => {
                return Err(KiraError::Archive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };
        let entry_path = target_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| KiraError::Archive(err.to_string()))?;
        members.push(ExtractedMember {
            name: member_name(&relative),
            path: entry_path,
        });
    }
    Ok(members)
}

pub fn extract_tar_bz2(
    tar_path: &Path,
    target_dir: &Path,
) -> Result<Vec<ExtractedMember>, KiraError> {
    let file = fs::File::open(tar_path)
        .map_err(|err| KiraError::Filesystem(format!("open tar {}: {err}", tar_path.display())))?;
    let mut archive = tar::Archive::new(BzDecoder::new(io::BufReader::new(file)));
    let entries = archive
        .entries()
        .map_err(|err| KiraError::Archive(err.to_string()))?;

    let mut members = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|err| KiraError::Archive(err.to_string()))?;
        let relative = entry
            .path()
            .map_err(|err| KiraError::Archive(err.to_string()))?
            .into_owned();
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return Err(KiraError::Archive(
                "tar entry path traversal detected".to_string(),
            ));
        }
        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(target_dir)
            .map_err(|err| KiraError::Archive(err.to_string()))?;
        if unpacked && is_file {
            members.push(ExtractedMember {
                name: member_name(&relative),
                path: target_dir.join(&relative),
            });
        }
    }
    Ok(members)
}

fn member_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
