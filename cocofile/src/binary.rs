//! Raw binary output: the emitted bytes and nothing else.

use crate::{CoCoFile, Container, ContainerError};

/// A binary file carries exactly one program with no header, so listing its
/// contents yields nothing and appending a second program is refused by the
/// front-end.
#[derive(Debug, Default)]
pub struct BinaryFile {
    buffer: Vec<u8>,
}

impl BinaryFile {
    pub fn new() -> BinaryFile {
        BinaryFile::default()
    }

    pub fn from_buffer(buffer: Vec<u8>) -> BinaryFile {
        BinaryFile { buffer }
    }
}

impl Container for BinaryFile {
    fn list_files(&self) -> Result<Vec<CoCoFile>, ContainerError> {
        Ok(Vec::new())
    }

    fn add_file(&mut self, file: &CoCoFile) -> Result<(), ContainerError> {
        self.buffer.extend_from_slice(&file.data);
        Ok(())
    }

    fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}
