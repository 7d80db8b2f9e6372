// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io;
use std::sync::Arc;

use super::{hand_off, TaskInfo, TaskMeta};
use crate::engine::{Callback, Finish, SeriesWork, SubTask};
use crate::errors::{errno_of, TaskState};
use crate::runtime::RuntimeHandle;

const FILE_QUEUE: &str = "file";

/// Positional file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    /// Read up to `len` bytes at `offset`.
    Read { offset: u64, len: usize },
    /// Write the task's buffer at `offset`.
    Write { offset: u64 },
    /// Fill the task's vectors in order from `offset` on.
    ReadVectored { offset: u64 },
    /// Write the task's vectors back to back from `offset` on.
    WriteVectored { offset: u64 },
}

/// `pread`/`pwrite` and their vectored forms on a shared file, run on the file
/// I/O pool.
///
/// After a read the buffer holds the bytes read; after a write it still holds
/// the data and [`FileIoTask::transferred`] tells how much of it was written.
/// Vectored operations work on [`FileIoTask::vectors`] instead; a vectored
/// read that reaches end of file leaves the unfilled vectors short or empty.
pub struct FileIoTask {
    meta: TaskMeta,
    runtime: RuntimeHandle,
    file: Arc<File>,
    op: FileOp,
    buffer: Vec<u8>,
    vectors: Vec<Vec<u8>>,
    transferred: usize,
    callback: Option<Callback<FileIoTask>>,
}

impl FileIoTask {
    pub(crate) fn read(runtime: RuntimeHandle, file: Arc<File>, offset: u64, len: usize) -> Self {
        Self::new(runtime, file, FileOp::Read { offset, len }, Vec::new())
    }

    pub(crate) fn write(runtime: RuntimeHandle, file: Arc<File>, offset: u64, data: Vec<u8>) -> Self {
        Self::new(runtime, file, FileOp::Write { offset }, data)
    }

    pub(crate) fn read_vectored(runtime: RuntimeHandle, file: Arc<File>, offset: u64, lens: &[usize]) -> Self {
        let mut task = Self::new(runtime, file, FileOp::ReadVectored { offset }, Vec::new());
        task.vectors = lens.iter().map(|&len| vec![0; len]).collect();
        task
    }

    pub(crate) fn write_vectored(runtime: RuntimeHandle, file: Arc<File>, offset: u64, vectors: Vec<Vec<u8>>) -> Self {
        let mut task = Self::new(runtime, file, FileOp::WriteVectored { offset }, Vec::new());
        task.vectors = vectors;
        task
    }

    fn new(runtime: RuntimeHandle, file: Arc<File>, op: FileOp, buffer: Vec<u8>) -> Self {
        Self {
            meta: TaskMeta::default(),
            runtime,
            file,
            op,
            buffer,
            vectors: Vec::new(),
            transferred: 0,
            callback: None,
        }
    }

    pub fn op(&self) -> FileOp {
        self.op
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn vectors(&self) -> &[Vec<u8>] {
        &self.vectors
    }

    pub fn take_vectors(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.vectors)
    }

    /// Bytes read or written.
    pub fn transferred(&self) -> usize {
        self.transferred
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut FileIoTask) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    fn perform(&mut self) -> io::Result<usize> {
        match self.op {
            FileOp::Read { offset, len } => {
                self.buffer.resize(len, 0);
                let n = read_at(&self.file, &mut self.buffer, offset)?;
                self.buffer.truncate(n);
                Ok(n)
            }
            FileOp::Write { offset } => write_at(&self.file, &self.buffer, offset),
            FileOp::ReadVectored { offset } => read_vectored_at(&self.file, &mut self.vectors, offset),
            FileOp::WriteVectored { offset } => write_vectored_at(&self.file, &self.vectors, offset),
        }
    }
}

fn read_vectored_at(file: &File, vectors: &mut [Vec<u8>], mut offset: u64) -> io::Result<usize> {
    let mut total = 0;
    let mut at_end = false;
    for vector in vectors.iter_mut() {
        let mut filled = 0;
        while !at_end && filled < vector.len() {
            match read_at(file, &mut vector[filled..], offset) {
                Ok(0) => at_end = true,
                Ok(n) => {
                    filled += n;
                    offset += n as u64;
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
        vector.truncate(filled);
        total += filled;
    }
    Ok(total)
}

fn write_vectored_at(file: &File, vectors: &[Vec<u8>], mut offset: u64) -> io::Result<usize> {
    let mut total = 0;
    for vector in vectors {
        let mut written = 0;
        while written < vector.len() {
            match write_at(file, &vector[written..], offset) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    written += n;
                    offset += n as u64;
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
        total += written;
    }
    Ok(total)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

impl TaskInfo for FileIoTask {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }
}

impl Finish for FileIoTask {
    const KIND: &'static str = "file";

    fn take_callback(&mut self) -> Option<Callback<Self>> {
        self.callback.take()
    }
}

impl SubTask for FileIoTask {
    fn dispatch(mut self: Box<Self>, series: SeriesWork) {
        self.meta.bind(&series);
        let runtime = self.runtime.clone();
        let pool = runtime.file_io();
        let queue = pool.queue(FILE_QUEUE);
        hand_off(
            self,
            series,
            |job| pool.submit_to(&queue, job),
            |task: &mut FileIoTask| match task.perform() {
                Ok(n) => {
                    task.transferred = n;
                    task.meta.complete(TaskState::Success, 0);
                }
                Err(error) => task.meta.complete(TaskState::SysError, errno_of(&error)),
            },
        );
    }
}
