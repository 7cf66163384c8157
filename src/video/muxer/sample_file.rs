//! File-based [`ContainerWriter`] writing length-prefixed samples
//!
//! Layout:
//!
//! ```text
//! "CHNK" version:u8
//! format_len:u32 format_json            (written by start)
//! { pts_us:i64 flags:u32 size:u32 payload }*
//! ```
//!
//! All integers are little endian. A file that was never started holds only
//! the magic and version.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::traits::{ContainerWriter, WriterFactory};
use crate::error::{AppError, Result};
use crate::video::encoder::{BufferFlags, BufferInfo};
use crate::video::format::MediaFormat;
use crate::video::output::OutputTarget;

const MAGIC: &[u8; 4] = b"CHNK";
const VERSION: u8 = 1;
const TRACK_INDEX: usize = 0;

/// Writes samples of a single video track to a file
pub struct SampleFileWriter {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    format: Option<MediaFormat>,
    started: bool,
    samples_written: u64,
    bytes_written: u64,
}

impl SampleFileWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(|e| {
            AppError::OutputTarget(format!(
                "Failed to create output file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        writer.write_all(MAGIC)?;
        writer.write_all(&[VERSION])?;

        debug!(path = %path.display(), "Sample file writer opened");

        Ok(Self {
            writer: Some(writer),
            path,
            format: None,
            started: false,
            samples_written: 0,
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| AppError::Writer(format!("{} already released", self.path.display())))
    }
}

impl ContainerWriter for SampleFileWriter {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        if self.format.is_some() {
            return Err(AppError::Writer("track already added".to_string()));
        }
        if self.started {
            return Err(AppError::Writer("cannot add track after start".to_string()));
        }
        self.format = Some(format.clone());
        Ok(TRACK_INDEX)
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(AppError::Writer("writer already started".to_string()));
        }
        let json = match self.format.as_ref() {
            Some(format) => serde_json::to_vec(format)?,
            None => return Err(AppError::Writer("start called before add_track".to_string())),
        };
        let writer = self.writer()?;
        writer.write_all(&(json.len() as u32).to_le_bytes())?;
        writer.write_all(&json)?;
        self.started = true;
        Ok(())
    }

    fn write_sample_data(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<()> {
        if !self.started {
            return Err(AppError::Writer("sample written before start".to_string()));
        }
        if track != TRACK_INDEX {
            return Err(AppError::Writer(format!("unknown track {}", track)));
        }
        let writer = self.writer()?;
        writer.write_all(&info.presentation_time_us.to_le_bytes())?;
        writer.write_all(&info.flags.bits().to_le_bytes())?;
        writer.write_all(&(data.len() as u32).to_le_bytes())?;
        writer.write_all(data)?;

        self.samples_written += 1;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Err(AppError::Writer("stop called before start".to_string()));
        }
        let path = self.path.display().to_string();
        self.writer()?
            .flush()
            .map_err(|e| AppError::Writer(format!("Failed to flush {}: {}", path, e)))?;
        self.started = false;

        info!(
            path = %path,
            samples = self.samples_written,
            bytes = self.bytes_written,
            "Sample file closed"
        );
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

/// Factory opening a [`SampleFileWriter`] at each target path
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleFileWriterFactory;

impl WriterFactory for SampleFileWriterFactory {
    fn open(&self, target: &OutputTarget) -> Result<Box<dyn ContainerWriter>> {
        Ok(Box::new(SampleFileWriter::create(&target.path)?))
    }
}

/// One sample read back from a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
    pub data: Vec<u8>,
}

/// Contents of a sample file
#[derive(Debug, Clone)]
pub struct SampleFile {
    /// Track format, absent when the writer was never started
    pub format: Option<MediaFormat>,
    pub samples: Vec<Sample>,
}

/// Read a sample file produced by [`SampleFileWriter`]
pub fn read_sample_file(path: impl AsRef<Path>) -> Result<SampleFile> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);

    let mut header = [0u8; 5];
    reader.read_exact(&mut header)?;
    if &header[..4] != MAGIC || header[4] != VERSION {
        return Err(AppError::Writer(format!(
            "{} is not a sample file",
            path.as_ref().display()
        )));
    }

    let mut rest = Vec::new();
    reader.read_to_end(&mut rest)?;
    if rest.is_empty() {
        return Ok(SampleFile {
            format: None,
            samples: Vec::new(),
        });
    }

    let mut cursor = Cursor { buf: &rest, pos: 0 };
    let format_len = cursor.u32()? as usize;
    let format: MediaFormat = serde_json::from_slice(cursor.take(format_len)?)?;

    let mut samples = Vec::new();
    while !cursor.is_empty() {
        let presentation_time_us = cursor.i64()?;
        let flags = BufferFlags::from_bits(cursor.u32()?);
        let size = cursor.u32()? as usize;
        let data = cursor.take(size)?.to_vec();
        samples.push(Sample {
            presentation_time_us,
            flags,
            data,
        });
    }

    Ok(SampleFile {
        format: Some(format),
        samples,
    })
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(AppError::Writer("truncated sample file".to_string()));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn i64(&mut self) -> Result<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(raw))
    }
}
