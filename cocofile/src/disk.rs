//! 35-track single-sided disk images, as produced by Disk Extended Color
//! BASIC.
//!
//! Track 17 holds the file allocation table and the 72-entry directory; the
//! remaining 34 tracks are split into 68 granules of 2304 bytes each.
//! Binary files carry a five-byte preamble (`$00`, data length, load
//! address) at the head of their first granule and a five-byte postamble
//! (`$FF 00 00`, exec address) after the data.

use byteorder::{ReadBytesExt, WriteBytesExt};
use log::debug;
use util::Endian;

use crate::{CoCoFile, Container, ContainerError, DataType, FileType};

const TRACKS: usize = 35;
const SECTORS_PER_TRACK: usize = 18;
const SECTOR_LEN: usize = 256;
const TOTAL_LEN: usize = TRACKS * SECTORS_PER_TRACK * SECTOR_LEN;

const GRANULE_LEN: usize = 2304;
const GRANULE_COUNT: usize = 68;
const FAT_OFFSET: usize = 0x13300;
const DIR_OFFSET: usize = 0x13400;
const DIR_ENTRIES: usize = 72;
const DIR_ENTRY_LEN: usize = 32;

const FAT_FREE: u8 = 0xFF;
const FAT_LAST_MASK: u8 = 0xC0;

const PREAMBLE_LEN: usize = 5;
const POSTAMBLE_LEN: usize = 5;

#[derive(Debug)]
pub struct DiskFile {
    buffer: Vec<u8>,
}

impl Default for DiskFile {
    fn default() -> DiskFile {
        DiskFile::new()
    }
}

impl DiskFile {
    /// A blank formatted image: every byte `$FF`, every granule free, every
    /// directory slot unused.
    pub fn new() -> DiskFile {
        DiskFile {
            buffer: vec![0xFF; TOTAL_LEN],
        }
    }

    pub fn from_buffer(buffer: Vec<u8>) -> DiskFile {
        DiskFile { buffer }
    }

    pub fn is_correct_type(buffer: &[u8]) -> bool {
        buffer.len() == TOTAL_LEN
    }

    /// The buffer offset of a granule. Granules 34 and up sit past the
    /// directory track, so the seek skips two extra granules' worth of
    /// bytes.
    fn seek_granule(granule: usize) -> usize {
        let mut offset = granule * GRANULE_LEN;
        if granule > 33 {
            offset += GRANULE_LEN * 2;
        }
        offset
    }

    fn fat(&self) -> &[u8] {
        &self.buffer[FAT_OFFSET..FAT_OFFSET + GRANULE_COUNT]
    }

    fn free_granules(&self, count: usize) -> Option<Vec<usize>> {
        let free: Vec<usize> = self
            .fat()
            .iter()
            .enumerate()
            .filter(|(_, &entry)| entry == FAT_FREE)
            .map(|(granule, _)| granule)
            .take(count)
            .collect();
        if free.len() == count {
            Some(free)
        } else {
            None
        }
    }

    fn free_directory_slot(&self) -> Option<usize> {
        (0..DIR_ENTRIES)
            .map(|entry| DIR_OFFSET + entry * DIR_ENTRY_LEN)
            .find(|&offset| self.buffer[offset] == 0x00 || self.buffer[offset] == 0xFF)
    }

    fn read_word(&self, pointer: usize) -> Result<u16, ContainerError> {
        let mut reader = self.buffer.get(pointer..pointer + 2).ok_or_else(|| {
            ContainerError::Validation(
                "Unable to read word - insufficient bytes in buffer".to_string(),
            )
        })?;
        Ok(reader.read_u16::<Endian>()?)
    }

    fn validate_sequence(&self, pointer: usize, sequence: &[u8]) -> bool {
        self.buffer
            .get(pointer..pointer + sequence.len())
            .map_or(false, |bytes| bytes == sequence)
    }

    /// Reads the preamble at the head of a file's first granule: a zero
    /// flag, the data length, and the load address.
    fn read_preamble(&self, granule: usize) -> Result<(u16, u16), ContainerError> {
        let pointer = Self::seek_granule(granule);
        if !self.validate_sequence(pointer, &[0x00]) {
            return Err(ContainerError::Validation("Invalid preamble flag".to_string()));
        }
        let data_length = self.read_word(pointer + 1)?;
        let load_addr = self.read_word(pointer + 3)?;
        Ok((data_length, load_addr))
    }

    /// Reads the postamble that follows the data: `$FF 00 00` and the exec
    /// address.
    fn read_postamble(&self, pointer: usize) -> Result<u16, ContainerError> {
        if !self.validate_sequence(pointer, &[0xFF, 0x00, 0x00]) {
            return Err(ContainerError::Validation(
                "Invalid postamble flags".to_string(),
            ));
        }
        self.read_word(pointer + 3)
    }

    /// Walks a file's granule chain collecting `data_length` bytes, and
    /// returns them with the offset just past the data.
    fn read_data(
        &self,
        starting_granule: usize,
        data_length: usize,
    ) -> Result<(Vec<u8>, usize), ContainerError> {
        let mut data = Vec::with_capacity(data_length);
        let mut granule = starting_granule;
        let mut remaining = data_length;
        let mut pointer = Self::seek_granule(granule) + PREAMBLE_LEN;
        let mut chunk_size = GRANULE_LEN - PREAMBLE_LEN;

        loop {
            let take = remaining.min(chunk_size);
            let chunk = self.buffer.get(pointer..pointer + take).ok_or_else(|| {
                ContainerError::Validation(
                    "Unable to read data - insufficient bytes in buffer".to_string(),
                )
            })?;
            data.extend_from_slice(chunk);
            pointer += take;
            remaining -= take;
            if remaining == 0 {
                return Ok((data, pointer));
            }
            granule = usize::from(self.fat()[granule]);
            if granule >= GRANULE_COUNT {
                return Err(ContainerError::Validation(
                    "granule chain ends before the file data".to_string(),
                ));
            }
            pointer = Self::seek_granule(granule);
            chunk_size = GRANULE_LEN;
        }
    }
}

impl Container for DiskFile {
    fn list_files(&self) -> Result<Vec<CoCoFile>, ContainerError> {
        let mut files = Vec::new();
        for entry in 0..DIR_ENTRIES {
            let pointer = DIR_OFFSET + entry * DIR_ENTRY_LEN;
            let first = self.buffer[pointer];
            if first == 0x00 || first == 0xFF {
                continue;
            }
            let name = String::from_utf8_lossy(&self.buffer[pointer..pointer + 8])
                .trim_end()
                .to_string();
            let extension =
                String::from_utf8_lossy(&self.buffer[pointer + 8..pointer + 11]).to_string();
            let file_type = FileType::from_byte(self.buffer[pointer + 11]);
            let data_type = DataType::from_byte(self.buffer[pointer + 12]);
            let starting_granule = usize::from(self.buffer[pointer + 13]);
            debug!(
                "directory entry {} [{}.{}] starts at granule {}",
                entry, name, extension, starting_granule
            );

            let (data_length, load_addr) = self.read_preamble(starting_granule)?;
            let (data, postamble_pointer) =
                self.read_data(starting_granule, usize::from(data_length))?;
            let exec_addr = self.read_postamble(postamble_pointer)?;

            files.push(CoCoFile {
                name,
                extension,
                file_type,
                data_type,
                gaps: false,
                load_addr,
                exec_addr,
                data,
                ignore_gaps: true,
            });
        }
        Ok(files)
    }

    fn add_file(&mut self, file: &CoCoFile) -> Result<(), ContainerError> {
        if file.name.is_empty() {
            return Err(ContainerError::Validation(
                "a disk file requires a program name".to_string(),
            ));
        }

        // Preamble, payload and postamble stream into the granule chain.
        let mut stream = Vec::with_capacity(file.data.len() + PREAMBLE_LEN + POSTAMBLE_LEN);
        stream.push(0x00);
        stream.write_u16::<Endian>(file.data.len() as u16)?;
        stream.write_u16::<Endian>(file.load_addr)?;
        stream.extend_from_slice(&file.data);
        stream.push(0xFF);
        stream.push(0x00);
        stream.push(0x00);
        stream.write_u16::<Endian>(file.exec_addr)?;

        let granules_needed = (stream.len() + GRANULE_LEN - 1) / GRANULE_LEN;
        let granules = self.free_granules(granules_needed).ok_or_else(|| {
            ContainerError::Validation("no free granules left on the disk image".to_string())
        })?;
        let slot = self.free_directory_slot().ok_or_else(|| {
            ContainerError::Validation("no free directory entries left on the disk image".to_string())
        })?;

        for (position, chunk) in stream.chunks(GRANULE_LEN).enumerate() {
            let offset = Self::seek_granule(granules[position]);
            self.buffer[offset..offset + chunk.len()].copy_from_slice(chunk);
        }

        // Chain the granules in the FAT; the final entry records how many
        // sectors of the last granule are in use.
        let last_granule_bytes = stream.len() - (granules_needed - 1) * GRANULE_LEN;
        let sectors_used = (last_granule_bytes + SECTOR_LEN - 1) / SECTOR_LEN;
        for pair in granules.windows(2) {
            self.buffer[FAT_OFFSET + pair[0]] = pair[1] as u8;
        }
        self.buffer[FAT_OFFSET + granules[granules_needed - 1]] =
            FAT_LAST_MASK + sectors_used as u8;

        let mut entry = Vec::with_capacity(DIR_ENTRY_LEN);
        for index in 0..8 {
            entry.push(file.name.as_bytes().get(index).copied().unwrap_or(0x20));
        }
        let extension = if file.extension.is_empty() {
            "BIN"
        } else {
            file.extension.as_str()
        };
        for index in 0..3 {
            entry.push(extension.as_bytes().get(index).copied().unwrap_or(0x20));
        }
        entry.push(file.file_type as u8);
        entry.push(file.data_type as u8);
        entry.push(granules[0] as u8);
        let last_sector_bytes = if last_granule_bytes % SECTOR_LEN == 0 {
            SECTOR_LEN as u16
        } else {
            (last_granule_bytes % SECTOR_LEN) as u16
        };
        entry.write_u16::<Endian>(last_sector_bytes)?;
        entry.resize(DIR_ENTRY_LEN, 0x00);
        self.buffer[slot..slot + DIR_ENTRY_LEN].copy_from_slice(&entry);
        Ok(())
    }

    fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}
