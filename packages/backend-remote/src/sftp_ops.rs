//! Every direct call into `russh_sftp::client::SftpSession` is funneled
//! through this module so the one external, less-stable API surface this
//! crate depends on has a single point of contact. Errors surface as
//! [`TransportError::Sftp`]; `lib.rs` attaches the path and the
//! operation-specific `BackendError` tag at the call site.

use std::collections::VecDeque;

use russh_sftp::client::fs::Metadata;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use workspaced_backend::Stat;
use workspaced_transport_ssh::TransportError;

fn err(source: russh_sftp::client::error::Error) -> TransportError {
    TransportError::Sftp(source.to_string())
}

pub async fn read(sftp: &SftpSession, path: &str) -> Result<Vec<u8>, TransportError> {
    let mut file = sftp.open_with_flags(path, OpenFlags::READ).await.map_err(err)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(|e| TransportError::Sftp(e.to_string()))?;
    Ok(buf)
}

pub async fn write(sftp: &SftpSession, path: &str, content: &[u8]) -> Result<(), TransportError> {
    let mut file = sftp
        .open_with_flags(path, OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)
        .await
        .map_err(err)?;
    file.write_all(content)
        .await
        .map_err(|e| TransportError::Sftp(e.to_string()))?;
    file.shutdown()
        .await
        .map_err(|e| TransportError::Sftp(e.to_string()))
}

pub async fn readdir(sftp: &SftpSession, path: &str) -> Result<Vec<String>, TransportError> {
    let entries = sftp.read_dir(path).await.map_err(err)?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| {
            let name = entry.file_name();
            if name == "." || name == ".." {
                None
            } else {
                Some(name)
            }
        })
        .collect();
    names.sort();
    Ok(names)
}

pub async fn readdir_with_stats(
    sftp: &SftpSession,
    path: &str,
) -> Result<Vec<(String, Stat)>, TransportError> {
    let entries = sftp.read_dir(path).await.map_err(err)?;
    let mut out: Vec<(String, Stat)> = entries
        .filter_map(|entry| {
            let name = entry.file_name();
            if name == "." || name == ".." {
                None
            } else {
                Some((name, metadata_to_stat(&entry.metadata())))
            }
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

pub async fn mkdir(sftp: &SftpSession, path: &str, recursive: bool) -> Result<(), TransportError> {
    if !recursive {
        return sftp.create_dir(path).await.map_err(err);
    }

    let mut segments: VecDeque<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut built = String::new();
    while let Some(seg) = segments.pop_front() {
        if !built.is_empty() {
            built.push('/');
        }
        built.push_str(seg);
        if sftp.metadata(built.as_str()).await.is_err() {
            sftp.create_dir(built.as_str()).await.map_err(err)?;
        }
    }
    Ok(())
}

pub async fn rename(sftp: &SftpSession, from: &str, to: &str) -> Result<(), TransportError> {
    sftp.rename(from, to).await.map_err(err)
}

pub async fn metadata(sftp: &SftpSession, path: &str) -> Result<Stat, TransportError> {
    let meta = sftp.metadata(path).await.map_err(err)?;
    Ok(metadata_to_stat(&meta))
}

pub async fn exists(sftp: &SftpSession, path: &str) -> bool {
    sftp.metadata(path).await.is_ok()
}

pub async fn rm(
    sftp: &SftpSession,
    path: &str,
    recursive: bool,
    force: bool,
) -> Result<(), TransportError> {
    let meta = match sftp.metadata(path).await {
        Ok(m) => m,
        Err(_) if force => return Ok(()),
        Err(e) => return Err(err(e)),
    };

    if meta.is_dir() {
        if recursive {
            remove_dir_recursive(sftp, path).await?;
        }
        sftp.remove_dir(path).await.map_err(err)?;
    } else {
        sftp.remove_file(path).await.map_err(err)?;
    }
    Ok(())
}

fn remove_dir_recursive<'a>(
    sftp: &'a SftpSession,
    path: &'a str,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), TransportError>> + Send + 'a>> {
    Box::pin(async move {
        let entries = sftp.read_dir(path).await.map_err(err)?;
        for entry in entries {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let child = format!("{path}/{name}");
            if entry.metadata().is_dir() {
                remove_dir_recursive(sftp, &child).await?;
                sftp.remove_dir(&child).await.map_err(err)?;
            } else {
                sftp.remove_file(&child).await.map_err(err)?;
            }
        }
        Ok(())
    })
}

fn metadata_to_stat(meta: &Metadata) -> Stat {
    let now = chrono::Utc::now();
    let to_dt = |secs: Option<u32>| {
        secs.and_then(|s| chrono::DateTime::from_timestamp(s as i64, 0))
            .unwrap_or(now)
    };
    Stat {
        size: meta.size.unwrap_or(0),
        mode: meta.permissions.unwrap_or(0o644),
        is_dir: meta.is_dir(),
        atime: to_dt(meta.atime),
        mtime: to_dt(meta.mtime),
        ctime: to_dt(meta.mtime),
    }
}
