use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// What a replay recovered.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// A truncated or corrupt tail was found and ignored.
    pub discarded_tail: bool,
    /// Length in bytes of the intact prefix that produced `events`.
    pub valid_len: u64,
}

/// Append-only write-ahead log of lodge events.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`, little endian.
/// Appends are staged in memory and reach the file only in `flush_sync()`. A
/// flush that fails is cut back off the file, so the log only ever holds
/// whole, acknowledged entries. A crash mid-append can still leave a torn
/// last entry; replay drops it and `truncate` removes it.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Bytes on disk that belong to acknowledged entries.
    committed_len: u64,
    pending: Vec<u8>,
    pending_events: u64,
    appends_since_compact: u64,
    /// Write only this many bytes of the next flush, then fail.
    #[cfg(test)]
    pub(crate) fail_next_write_after: Option<usize>,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            committed_len,
            pending: Vec::new(),
            pending_events: 0,
            appends_since_compact: 0,
            #[cfg(test)]
            fail_next_write_after: None,
        })
    }

    /// Cut the file at `path` back to `len` bytes, dropping a torn tail
    /// found by `replay`.
    pub fn truncate(path: &Path, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()
    }

    /// Append and fsync one event.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Stage an event without writing it. Durable only after `flush_sync()`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.pending, event)?;
        self.pending_events += 1;
        Ok(())
    }

    /// Drop everything staged since the last flush.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_events = 0;
    }

    /// Write and fsync the staged entries. On failure the file is truncated
    /// back to its last acknowledged entry and the staged entries are gone.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        let result = self.write_pending();
        match &result {
            Ok(()) => {
                self.committed_len += self.pending.len() as u64;
                self.appends_since_compact += self.pending_events;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "lodge log write failed: {e}");
                self.rollback();
            }
        }
        self.discard_pending();
        result
    }

    fn write_pending(&mut self) -> io::Result<()> {
        #[cfg(test)]
        {
            if let Some(n) = self.fail_next_write_after.take() {
                let n = n.min(self.pending.len());
                self.file.write_all(&self.pending[..n])?;
                return Err(io::Error::other("simulated short write"));
            }
        }
        self.file.write_all(&self.pending)?;
        self.file.sync_all()
    }

    fn rollback(&mut self) {
        if let Err(e) = self
            .file
            .set_len(self.committed_len)
            .and_then(|()| self.file.sync_all())
        {
            tracing::error!(
                path = %self.path.display(),
                "could not cut failed write off the lodge log: {e}"
            );
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write the replacement log next to the live one and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::compact_tmp_path(path))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the replacement over the live log and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.committed_len = file.metadata()?.len();
        self.file = file;
        self.discard_pending();
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every intact event. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            match read_exact_or_eof(&mut reader, &mut len_buf)? {
                Chunk::Full => {}
                Chunk::Empty => break,
                Chunk::Partial => {
                    replay.discarded_tail = true;
                    break;
                }
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if read_exact_or_eof(&mut reader, &mut payload)? != Chunk::Full
                || read_exact_or_eof(&mut reader, &mut crc_buf)? != Chunk::Full
                || u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload)
            {
                replay.discarded_tail = true;
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => {
                    replay.events.push(event);
                    replay.valid_len += 8 + len as u64;
                }
                Err(_) => {
                    replay.discarded_tail = true;
                    break;
                }
            }
        }

        Ok(replay)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Full,
    /// Clean end of file before the first byte.
    Empty,
    Partial,
}

fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Chunk> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Ok(if filled == 0 && !buf.is_empty() {
                    Chunk::Empty
                } else {
                    Chunk::Partial
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Chunk::Full)
}
