//! Append-Only File Rewrite
//!
//! The store is dumped as a sequence of RESP `SET` commands, one per live
//! key, so the file can be replayed by any RESP client. Keys with a TTL are
//! written with `PX <remaining ms>`.
//!
//! Each rewrite truncates the file. Writes are best effort: nothing is
//! fsynced and the file is never read back by the server.

use crate::protocol::Reply;
use crate::storage::Store;
use bytes::{Bytes, BytesMut};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AofError {
    #[error("failed to write AOF {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rewrites `path` from the live contents of `store`.
///
/// Returns the number of keys written.
pub fn rewrite(store: &Store, path: &Path) -> Result<usize, AofError> {
    let io_err = |source| AofError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    let mut buf = BytesMut::with_capacity(4096);
    let now = Instant::now();
    let mut written = 0;

    for (key, entry) in store.live_entries(now) {
        let mut parts = vec![
            Reply::bulk(Bytes::from_static(b"SET")),
            Reply::bulk(key.clone()),
            Reply::bulk(entry.value.clone()),
        ];
        if let Some(ttl) = entry.remaining_ttl(now) {
            let ms = ttl.as_millis().max(1);
            parts.push(Reply::bulk(Bytes::from_static(b"PX")));
            parts.push(Reply::bulk(Bytes::from(ms.to_string())));
        }

        buf.clear();
        Reply::Array(parts).encode(&mut buf);
        writer.write_all(&buf).map_err(io_err)?;
        written += 1;
    }

    writer.flush().map_err(io_err)?;
    Ok(written)
}
