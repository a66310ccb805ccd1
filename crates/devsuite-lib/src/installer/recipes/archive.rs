use crate::installer::core::traits::{InstallContext, Recipe};
use crate::installer::types::ProgressReporter;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default recipe: unpack every artifact into the target folder.
pub struct ArchiveRecipe;

impl Recipe for ArchiveRecipe {
    fn install_after_requirements<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            install_artifacts(ctx, &*reporter).await
        })
    }
}

/// Unpack or copy each artifact of `ctx` into its target folder, reporting one step per file.
pub(crate) async fn install_artifacts(
    ctx: &InstallContext<'_>,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    reporter.set_total_amount(ctx.artifacts.len() as u64);
    for (i, artifact) in ctx.artifacts.iter().enumerate() {
        reporter.set_status(&format!(
            "Extracting {}",
            artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
        extract_archive(artifact, &ctx.target_dir).await?;
        reporter.set_current(i as u64 + 1);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    /// Anything else is copied as is
    Plain,
}

impl ArchiveFormat {
    pub fn of(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".zip") {
            ArchiveFormat::Zip
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Plain
        }
    }
}

/// Extract `archive` into `dest`. Entries that would land outside `dest` are refused.
/// Returns the copied path for plain files, `dest` otherwise.
pub async fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest))
        .await
        .context("Extraction task panicked")?
}

fn extract_blocking(archive: &Path, dest: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest).with_context(|| format!("Failed to create {:?}", dest))?;
    log::debug!("Extracting {:?} to {:?}", archive, dest);

    match ArchiveFormat::of(archive) {
        ArchiveFormat::Zip => extract_zip(archive, dest).map(|_| dest.to_path_buf()),
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest).map(|_| dest.to_path_buf()),
        ArchiveFormat::Plain => {
            let name = archive
                .file_name()
                .with_context(|| format!("{:?} has no file name", archive))?;
            let target = dest.join(name);
            std::fs::copy(archive, &target)
                .with_context(|| format!("Failed to copy {:?} to {:?}", archive, target))?;
            Ok(target)
        }
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).with_context(|| format!("Failed to open {:?}", archive))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("{:?} is not a valid zip archive", archive))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            anyhow::bail!("Refusing zip entry outside the target: {}", entry.name());
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)
            .with_context(|| format!("Failed to create {:?}", outpath))?;
        std::io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let file = File::open(archive).with_context(|| format!("Failed to open {:?}", archive))?;
    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));

    for entry in tar.entries()? {
        let mut entry = entry?;
        // unpack_in skips entries containing `..` and returns false for them
        if !entry.unpack_in(dest)? {
            let path = entry.path()?.into_owned();
            anyhow::bail!("Refusing tar entry outside the target: {:?}", path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn formats_by_extension() {
        assert_eq!(ArchiveFormat::of(Path::new("jdk.ZIP")), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::of(Path::new("oc.tar.gz")), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::of(Path::new("oc.tgz")), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::of(Path::new("kubectl.exe")), ArchiveFormat::Plain);
    }

    #[tokio::test]
    async fn extracts_zip_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("ide.zip");
        write_zip(&archive, &[("ide/ide.ini", b"-vmargs\n"), ("ide/readme.txt", b"hi")]);

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.join("ide/ide.ini")).unwrap(),
            "-vmargs\n"
        );
        assert!(dest.join("ide/readme.txt").exists());
    }

    #[tokio::test]
    async fn refuses_zip_slip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", b"x")]);

        let dest = dir.path().join("out");
        assert!(extract_archive(&archive, &dest).await.is_err());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn extracts_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("oc.tar.gz");
        {
            let file = File::create(&archive).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, "oc", &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).await.unwrap();
        assert!(dest.join("oc").exists());
    }

    #[tokio::test]
    async fn copies_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("kubectl");
        std::fs::write(&file, b"bin").unwrap();

        let dest = dir.path().join("out");
        let copied = extract_archive(&file, &dest).await.unwrap();
        assert_eq!(copied, dest.join("kubectl"));
        assert_eq!(std::fs::read(copied).unwrap(), b"bin");
    }
}
