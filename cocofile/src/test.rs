use crate::binary::BinaryFile;
use crate::cassette::CassetteFile;
use crate::disk::DiskFile;
use crate::{open_container, CoCoFile, Container, DataType, FileType};

fn object_file(name: &str, data: Vec<u8>) -> CoCoFile {
    CoCoFile {
        name: name.to_string(),
        extension: String::new(),
        file_type: FileType::Object,
        data_type: DataType::Binary,
        gaps: false,
        load_addr: 0x0600,
        exec_addr: 0x0600,
        data,
        ignore_gaps: false,
    }
}

#[test]
fn binary_container_is_raw_bytes() {
    let mut container = BinaryFile::new();
    container
        .add_file(&object_file("TEST", vec![0x01, 0x02, 0x03]))
        .unwrap();
    assert_eq!(&[0x01, 0x02, 0x03], container.buffer());
    assert!(container.list_files().unwrap().is_empty());
}

#[test]
fn cassette_image_layout_is_exact() {
    let mut container = CassetteFile::new();
    container
        .add_file(&object_file("TEST", vec![0x01, 0x02]))
        .unwrap();
    let buffer = container.buffer();

    // Leader, header block, leader, one data block, EOF block.
    assert_eq!(128 + 21 + 128 + 8 + 6, buffer.len());
    assert!(buffer[..128].iter().all(|&b| b == 0x55));
    assert_eq!(
        &[
            0x55, 0x3C, 0x00, 0x0F, 0x54, 0x45, 0x53, 0x54, 0x20, 0x20, 0x20, 0x20, 0x02, 0x00,
            0x00, 0x06, 0x00, 0x06, 0x00, 0xDD, 0x55
        ],
        &buffer[128..149]
    );
    assert!(buffer[149..277].iter().all(|&b| b == 0x55));
    assert_eq!(
        &[0x55, 0x3C, 0x01, 0x02, 0x01, 0x02, 0x06, 0x55],
        &buffer[277..285]
    );
    assert_eq!(&[0x55, 0x3C, 0xFF, 0x00, 0xFF, 0x55], &buffer[285..291]);
}

#[test]
fn cassette_round_trip() {
    let mut container = CassetteFile::new();
    container
        .add_file(&object_file("TEST", vec![0x01, 0x02]))
        .unwrap();
    let files = container.list_files().unwrap();
    assert_eq!(1, files.len());
    assert_eq!("TEST", files[0].name);
    assert_eq!(FileType::Object, files[0].file_type);
    assert_eq!(DataType::Binary, files[0].data_type);
    assert_eq!(0x0600, files[0].load_addr);
    assert_eq!(0x0600, files[0].exec_addr);
    assert_eq!(vec![0x01, 0x02], files[0].data);
}

#[test]
fn cassette_long_payloads_split_into_blocks() {
    let data: Vec<u8> = (0..300).map(|value| (value & 0xFF) as u8).collect();
    let mut container = CassetteFile::new();
    container.add_file(&object_file("LONG", data.clone())).unwrap();

    let files = container.list_files().unwrap();
    assert_eq!(data, files[0].data);

    // 255 bytes in the first block, 45 in the second.
    let buffer = container.buffer();
    let first_block = 128 + 21 + 128;
    assert_eq!(0xFF, buffer[first_block + 3]);
    let second_block = first_block + 4 + 255 + 2;
    assert_eq!(45, buffer[second_block + 3]);
}

#[test]
fn cassette_holds_more_than_one_file() {
    let mut container = CassetteFile::new();
    container
        .add_file(&object_file("FIRST", vec![0x01]))
        .unwrap();
    container
        .add_file(&object_file("SECOND", vec![0x02]))
        .unwrap();
    let files = container.list_files().unwrap();
    assert_eq!(2, files.len());
    assert_eq!("FIRST", files[0].name);
    assert_eq!("SECOND", files[1].name);
}

#[test]
fn cassette_requires_a_name() {
    let mut container = CassetteFile::new();
    assert!(container.add_file(&object_file("", vec![0x01])).is_err());
}

#[test]
fn disk_directory_and_fat_entries() {
    let mut container = DiskFile::new();
    container
        .add_file(&object_file("TEST", vec![0x01, 0x02]))
        .unwrap();
    let buffer = container.buffer();

    // Granule 0 carries the preamble, payload, and postamble.
    assert_eq!(
        &[0x00, 0x00, 0x02, 0x06, 0x00, 0x01, 0x02, 0xFF, 0x00, 0x00, 0x06, 0x00],
        &buffer[..12]
    );
    // One sector of the final granule in use.
    assert_eq!(0xC1, buffer[0x13300]);
    // Directory entry: name, extension, types, granule, last-sector bytes.
    assert_eq!(
        &[
            0x54, 0x45, 0x53, 0x54, 0x20, 0x20, 0x20, 0x20, 0x42, 0x49, 0x4E, 0x02, 0x00, 0x00,
            0x00, 0x0C
        ],
        &buffer[0x13400..0x13410]
    );
}

#[test]
fn disk_round_trip() {
    let mut container = DiskFile::new();
    container
        .add_file(&object_file("TEST", vec![0x01, 0x02]))
        .unwrap();
    let files = container.list_files().unwrap();
    assert_eq!(1, files.len());
    assert_eq!("TEST", files[0].name);
    assert_eq!("BIN", files[0].extension);
    assert_eq!(0x0600, files[0].load_addr);
    assert_eq!(0x0600, files[0].exec_addr);
    assert_eq!(vec![0x01, 0x02], files[0].data);
}

#[test]
fn disk_files_span_granules() {
    let data: Vec<u8> = (0..4000).map(|value| (value % 251) as u8).collect();
    let mut container = DiskFile::new();
    container.add_file(&object_file("BIG", data.clone())).unwrap();

    // 4010 streamed bytes need two granules; seven sectors of the second
    // are in use.
    assert_eq!(0x01, container.buffer()[0x13300]);
    assert_eq!(0xC7, container.buffer()[0x13301]);

    let files = container.list_files().unwrap();
    assert_eq!(data, files[0].data);
}

#[test]
fn disk_allocates_past_existing_files() {
    let mut container = DiskFile::new();
    container
        .add_file(&object_file("FIRST", vec![0x01]))
        .unwrap();
    container
        .add_file(&object_file("SECOND", vec![0x02]))
        .unwrap();
    let files = container.list_files().unwrap();
    assert_eq!(2, files.len());
    assert_eq!(vec![0x01], files[0].data);
    assert_eq!(vec![0x02], files[1].data);
    // The second file starts in the next free granule.
    assert_eq!(0x01, container.buffer()[0x13400 + 32 + 13]);
}

#[test]
fn container_detection() {
    let mut cassette = CassetteFile::new();
    cassette
        .add_file(&object_file("TEST", vec![0x01]))
        .unwrap();
    let detected = open_container(cassette.buffer().to_vec()).unwrap();
    assert_eq!(1, detected.list_files().unwrap().len());

    let disk = DiskFile::new();
    let detected = open_container(disk.buffer().to_vec()).unwrap();
    assert!(detected.list_files().unwrap().is_empty());

    assert!(open_container(vec![0x00; 64]).is_err());
}
