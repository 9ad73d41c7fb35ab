//! Container formats for Color Computer programs: raw binaries, cassette
//! images, and 35-track disk images.
//!
//! Containers operate on owned in-memory buffers; reading a container from
//! disk and writing one back are thin helpers over the buffer. Use
//! [`open_container`] to detect the format of an existing image.

use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

pub mod binary;
pub mod cassette;
pub mod disk;

#[cfg(test)]
mod test;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("{0}")]
    Validation(String),

    #[error("[{0}] already exists, use --append to add to this file")]
    FileExists(String),

    #[error("[{0}] file not found")]
    FileNotFound(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// The file type byte carried in cassette headers and directory entries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileType {
    Basic = 0x00,
    Data = 0x01,
    Object = 0x02,
}

impl FileType {
    pub fn from_byte(byte: u8) -> FileType {
        match byte {
            0x01 => FileType::Data,
            0x02 => FileType::Object,
            _ => FileType::Basic,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FileType::Basic => "BASIC",
            FileType::Data => "Data",
            FileType::Object => "Object",
        };
        write!(f, "{}", name)
    }
}

/// The data type byte: binary images or ASCII listings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataType {
    Binary = 0x00,
    Ascii = 0xFF,
}

impl DataType {
    pub fn from_byte(byte: u8) -> DataType {
        if byte == 0xFF {
            DataType::Ascii
        } else {
            DataType::Binary
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DataType::Binary => "Binary",
            DataType::Ascii => "ASCII",
        };
        write!(f, "{}", name)
    }
}

/// One program as stored on (or destined for) a container, with the metadata
/// the Color Computer needs to load and start it.
#[derive(Clone, Debug)]
pub struct CoCoFile {
    pub name: String,
    pub extension: String,
    pub file_type: FileType,
    pub data_type: DataType,
    pub gaps: bool,
    pub load_addr: u16,
    pub exec_addr: u16,
    pub data: Vec<u8>,
    /// Set by containers whose format has no gap flag.
    pub ignore_gaps: bool,
}

impl Default for CoCoFile {
    fn default() -> CoCoFile {
        CoCoFile {
            name: String::new(),
            extension: String::new(),
            file_type: FileType::Object,
            data_type: DataType::Binary,
            gaps: false,
            load_addr: 0,
            exec_addr: 0,
            data: Vec::new(),
            ignore_gaps: false,
        }
    }
}

impl fmt::Display for CoCoFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Filename:   {}", self.name)?;
        writeln!(f, "Extension:  {}", self.extension)?;
        writeln!(f, "File Type:  {}", self.file_type)?;
        writeln!(f, "Data Type:  {}", self.data_type)?;
        if !self.ignore_gaps {
            let gaps = if self.gaps { "Gaps" } else { "No Gaps" };
            writeln!(f, "Gap Status: {}", gaps)?;
        }
        if self.file_type == FileType::Object {
            writeln!(f, "Load Addr:  ${:04X}", self.load_addr)?;
            writeln!(f, "Exec Addr:  ${:04X}", self.exec_addr)?;
        }
        Ok(())
    }
}

/// A container holds zero or more CoCoFiles inside one host-file buffer.
pub trait Container {
    fn list_files(&self) -> Result<Vec<CoCoFile>, ContainerError>;
    fn add_file(&mut self, file: &CoCoFile) -> Result<(), ContainerError>;
    fn buffer(&self) -> &[u8];
}

/// Detects the format of an existing image and returns the matching
/// container.
pub fn open_container(buffer: Vec<u8>) -> Result<Box<dyn Container>, ContainerError> {
    if cassette::CassetteFile::is_correct_type(&buffer) {
        return Ok(Box::new(cassette::CassetteFile::from_buffer(buffer)));
    }
    if disk::DiskFile::is_correct_type(&buffer) {
        return Ok(Box::new(disk::DiskFile::from_buffer(buffer)));
    }
    Err(ContainerError::Validation(
        "unable to determine the container format".to_string(),
    ))
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, ContainerError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ContainerError::FileNotFound(path.display().to_string()));
    }
    let mut buffer = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn write_file<P: AsRef<Path>>(path: P, buffer: &[u8]) -> Result<(), ContainerError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(buffer)?;
    Ok(())
}
