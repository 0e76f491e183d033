//! A scripted [`GattLink`] that records every write.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use bts::{GattLink, Handle, LinkError, WriteKind};
use bytes::Bytes;

/// One write observed by a [`RecordingLink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedWrite {
    pub handle: Handle,
    pub data: Bytes,
    pub kind: WriteKind,
}

/// Link returning scripted read values and recording writes.
///
/// Once the script is exhausted, reads return the repeated value if one was
/// set and otherwise never complete, which lets tests drive the response
/// deadline.
#[derive(Debug, Default)]
pub struct RecordingLink {
    reads: Mutex<VecDeque<Result<Bytes, LinkError>>>,
    repeated: Mutex<Option<Bytes>>,
    writes: Mutex<Vec<RecordedWrite>>,
    fail_writes: Mutex<bool>,
    stalled: Mutex<Option<Handle>>,
}

impl RecordingLink {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Queue `value` as the result of the next unanswered read.
    #[must_use]
    pub fn with_read(self, value: impl Into<Bytes>) -> Self {
        lock(&self.reads).push_back(Ok(value.into()));
        self
    }

    /// Queue a failed read.
    #[must_use]
    pub fn with_read_error(self, error: LinkError) -> Self {
        lock(&self.reads).push_back(Err(error));
        self
    }

    /// Answer every read after the script with `value`.
    #[must_use]
    pub fn repeating(self, value: impl Into<Bytes>) -> Self {
        *lock(&self.repeated) = Some(value.into());
        self
    }

    /// Never complete writes to `handle`.
    #[must_use]
    pub fn stall_writes_to(self, handle: Handle) -> Self {
        *lock(&self.stalled) = Some(handle);
        self
    }

    /// Make every subsequent write fail with [`LinkError::Disconnected`].
    pub fn disconnect(&self) { *lock(&self.fail_writes) = true; }

    /// Writes seen so far, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> { lock(&self.writes).clone() }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().expect("recording link poisoned") }

#[async_trait]
impl GattLink for RecordingLink {
    async fn read(&self, _handle: Handle) -> Result<Bytes, LinkError> {
        let next = lock(&self.reads).pop_front();
        let repeated = lock(&self.repeated).clone();
        match (next, repeated) {
            (Some(result), _) => result,
            (None, Some(value)) => Ok(value),
            (None, None) => std::future::pending().await,
        }
    }

    async fn write(&self, handle: Handle, data: Bytes, kind: WriteKind) -> Result<(), LinkError> {
        if *lock(&self.fail_writes) {
            return Err(LinkError::Disconnected);
        }
        let stalled = *lock(&self.stalled) == Some(handle);
        if stalled {
            return std::future::pending().await;
        }
        lock(&self.writes).push(RecordedWrite { handle, data, kind });
        Ok(())
    }
}
