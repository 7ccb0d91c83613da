//! SFTP subsystem handler (spec §4.6: SFTP channels fall back to a normal
//! stat/read/write/mkdir/rm/rename mapping onto the same [`Backend`] used
//! by HTTP and MCP). Written against `russh_sftp::server::Handler`'s
//! documented surface; there is no adapted example for this in the
//! retrieved pack (see `ssh_server.rs`'s module doc).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};

use workspaced_backend::{Backend, RmOptions};

enum OpenHandle {
    File { path: String, write: bool },
    Dir { entries: Vec<String>, offset: usize },
}

/// One SFTP session's worth of state: the open-handle table keyed by the
/// opaque handle strings this implementation hands back to the client.
pub struct WorkspacedSftpHandler {
    backend: Arc<dyn Backend>,
    handles: HashMap<String, OpenHandle>,
    next_handle: AtomicU32,
}

impl WorkspacedSftpHandler {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            handles: HashMap::new(),
            next_handle: AtomicU32::new(1),
        }
    }

    fn alloc_handle(&self) -> String {
        self.next_handle.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn stat_to_attrs(stat: &workspaced_backend::Stat) -> FileAttributes {
        let kind_bits = if stat.is_dir { 0o040000 } else { 0o100000 };
        FileAttributes {
            size: Some(stat.size),
            uid: None,
            user: None,
            gid: None,
            group: None,
            permissions: Some(kind_bits | (stat.mode & 0o7777)),
            atime: Some(stat.atime.timestamp().max(0) as u32),
            mtime: Some(stat.mtime.timestamp().max(0) as u32),
        }
    }
}

type SftpResult<T> = Result<T, StatusCode>;

#[async_trait]
impl russh_sftp::server::Handler for WorkspacedSftpHandler {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        Ok(Version::new_with_version(version))
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let write = pflags.contains(OpenFlags::WRITE) || pflags.contains(OpenFlags::CREATE);
        if write {
            if pflags.contains(OpenFlags::CREATE) && !pflags.contains(OpenFlags::TRUNCATE) {
                let exists = self.backend.exists(&filename).await.unwrap_or(false);
                if !exists {
                    self.backend
                        .touch(&filename)
                        .await
                        .map_err(|_| StatusCode::Failure)?;
                }
            }
        } else {
            self.backend
                .stat(&filename)
                .await
                .map_err(|_| StatusCode::NoSuchFile)?;
        }

        let handle = self.alloc_handle();
        self.handles.insert(
            handle.clone(),
            OpenHandle::File {
                path: filename,
                write,
            },
        );
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        self.handles.remove(&handle);
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: String::new(),
            language_tag: String::new(),
        })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let OpenHandle::File { path, .. } =
            self.handles.get(&handle).ok_or(StatusCode::Failure)?
        else {
            return Err(StatusCode::Failure);
        };
        let content = self
            .backend
            .read(path)
            .await
            .map_err(|_| StatusCode::Failure)?;
        let start = offset as usize;
        if start >= content.len() {
            return Err(StatusCode::Eof);
        }
        let end = (start + len as usize).min(content.len());
        Ok(Data {
            id,
            data: content[start..end].to_vec(),
        })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let OpenHandle::File { path, .. } =
            self.handles.get(&handle).ok_or(StatusCode::Failure)?
        else {
            return Err(StatusCode::Failure);
        };

        let mut existing = self.backend.read(path).await.unwrap_or_default();
        let start = offset as usize;
        if existing.len() < start {
            existing.resize(start, 0);
        }
        let end = start + data.len();
        if existing.len() < end {
            existing.resize(end, 0);
        }
        existing[start..end].copy_from_slice(&data);

        self.backend
            .write(path, &existing)
            .await
            .map_err(|_| StatusCode::Failure)?;

        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: String::new(),
            language_tag: String::new(),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> SftpResult<Attrs> {
        self.stat(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> SftpResult<Attrs> {
        let OpenHandle::File { path, .. } =
            self.handles.get(&handle).ok_or(StatusCode::Failure)?
        else {
            return Err(StatusCode::Failure);
        };
        let path = path.clone();
        self.stat(id, path).await
    }

    async fn stat(&mut self, id: u32, path: String) -> SftpResult<Attrs> {
        let stat = self
            .backend
            .stat(&path)
            .await
            .map_err(|_| StatusCode::NoSuchFile)?;
        Ok(Attrs {
            id,
            attrs: Self::stat_to_attrs(&stat),
        })
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let entries = self
            .backend
            .readdir(&path)
            .await
            .map_err(|_| StatusCode::NoSuchFile)?;
        let handle = self.alloc_handle();
        self.handles.insert(
            handle.clone(),
            OpenHandle::Dir {
                entries,
                offset: 0,
            },
        );
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let OpenHandle::Dir { entries, offset } =
            self.handles.get_mut(&handle).ok_or(StatusCode::Failure)?
        else {
            return Err(StatusCode::Failure);
        };

        if *offset >= entries.len() {
            return Err(StatusCode::Eof);
        }

        let batch: Vec<String> = entries[*offset..].to_vec();
        *offset = entries.len();

        let files = batch
            .into_iter()
            .map(|name| File {
                filename: name,
                longname: String::new(),
                attrs: FileAttributes::default(),
            })
            .collect();

        Ok(Name { id, files })
    }

    async fn remove(&mut self, id: u32, filename: String) -> SftpResult<Status> {
        self.backend
            .rm(&filename, RmOptions { recursive: false, force: false })
            .await
            .map_err(|_| StatusCode::Failure)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: String::new(),
            language_tag: String::new(),
        })
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> SftpResult<Status> {
        self.backend
            .mkdir(&path, true)
            .await
            .map_err(|_| StatusCode::Failure)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: String::new(),
            language_tag: String::new(),
        })
    }

    async fn rmdir(&mut self, id: u32, path: String) -> SftpResult<Status> {
        self.backend
            .rm(&path, RmOptions { recursive: true, force: false })
            .await
            .map_err(|_| StatusCode::Failure)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: String::new(),
            language_tag: String::new(),
        })
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> SftpResult<Status> {
        self.backend
            .rename(&oldpath, &newpath)
            .await
            .map_err(|_| StatusCode::Failure)?;
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: String::new(),
            language_tag: String::new(),
        })
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        Ok(Name {
            id,
            files: vec![File {
                filename: path,
                longname: String::new(),
                attrs: FileAttributes::default(),
            }],
        })
    }
}
