#[macro_use]
extern crate clap;

use clap::Arg;
use cocoasm::{AssemblerError, Program, SourceReader};
use cocofile::binary::BinaryFile;
use cocofile::cassette::CassetteFile;
use cocofile::disk::DiskFile;
use cocofile::{CoCoFile, Container, ContainerError, DataType, FileType};
use log::debug;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

/// Resolves INCLUDE files relative to the directory of the input file.
struct FileSourceReader {
    base: PathBuf,
}

impl SourceReader for FileSourceReader {
    fn read_source(&self, filename: &str) -> Result<Vec<String>, AssemblerError> {
        let path = self.base.join(filename);
        debug!("reading include file {}", path.display());
        let contents = read_lines(&path)
            .map_err(|err| AssemblerError::Io(format!("[{}] {}", path.display(), err)))?;
        Ok(contents)
    }
}

fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let mut contents = String::new();
    BufReader::new(File::open(path)?).read_to_string(&mut contents)?;
    Ok(contents.lines().map(str::to_string).collect())
}

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("the assembly language input file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("symbols")
                .long("symbols")
                .help("print out the symbol table"),
        )
        .arg(
            Arg::with_name("print")
                .long("print")
                .help("print out the assembled statements when finished"),
        )
        .arg(
            Arg::with_name("bin_file")
                .long("bin_file")
                .takes_value(true)
                .value_name("BIN_FILE")
                .help("stores the assembled program in a binary BIN_FILE"),
        )
        .arg(
            Arg::with_name("cas_file")
                .long("cas_file")
                .takes_value(true)
                .value_name("CAS_FILE")
                .help("stores the assembled program in a cassette image CAS_FILE"),
        )
        .arg(
            Arg::with_name("dsk_file")
                .long("dsk_file")
                .takes_value(true)
                .value_name("DSK_FILE")
                .help("stores the assembled program in a disk image DSK_FILE"),
        )
        .arg(
            Arg::with_name("name")
                .long("name")
                .takes_value(true)
                .value_name("NAME")
                .help("the name of the file to be created on the cassette or disk image"),
        )
        .arg(
            Arg::with_name("append")
                .long("append")
                .help("appends to an existing cassette or disk file if it exists"),
        )
        .arg(
            Arg::with_name("width")
                .long("width")
                .takes_value(true)
                .value_name("N")
                .default_value("100")
                .help("the width of the console for printing results"),
        )
        .get_matches();

    let width = value_t!(matches.value_of("width"), usize).unwrap_or_else(|err| err.exit());
    let input = matches.value_of("INPUT").unwrap();
    let input_path = Path::new(input);

    let contents = match read_lines(input_path) {
        Ok(contents) => contents,
        Err(err) => {
            println!("Unable to read [{}]: {}", input, err);
            process::exit(1);
        }
    };

    let reader = FileSourceReader {
        base: input_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    let mut program = Program::new();
    if let Err(err) = program.process(&contents, &reader, width) {
        println!("{}", err);
        if let Some(context) = err.context() {
            println!("{}", context);
        }
        process::exit(1);
    }

    if matches.is_present("symbols") {
        println!("-- Symbol Table --");
        for line in program.symbol_table_listing() {
            println!("{}", line);
        }
    }

    if matches.is_present("print") {
        println!("-- Assembled Statements --");
        for line in program.statement_listing() {
            println!("{}", line);
        }
    }

    let load_addr = program
        .origin()
        .numeric()
        .map(|numeric| numeric.int())
        .unwrap_or(0);
    let exec_addr = program
        .exec_address()
        .and_then(|value| value.numeric())
        .map(|numeric| numeric.int())
        .unwrap_or(load_addr);
    let name = program
        .name()
        .map(str::to_string)
        .or_else(|| matches.value_of("name").map(str::to_string));

    let coco_file = CoCoFile {
        name: name.clone().unwrap_or_default(),
        extension: "BIN".to_string(),
        file_type: FileType::Object,
        data_type: DataType::Binary,
        gaps: false,
        load_addr,
        exec_addr,
        data: program.binary_array(),
        ignore_gaps: false,
    };

    let append = matches.is_present("append");

    if let Some(path) = matches.value_of("bin_file") {
        if let Err(err) = save_binary(path, &coco_file, append) {
            println!("Unable to save binary file:");
            println!("{}", err);
        }
    }

    if let Some(path) = matches.value_of("cas_file") {
        if name.is_none() {
            println!("No name for the program specified, not creating cassette file");
            return;
        }
        if let Err(err) = save_cassette(path, &coco_file, append) {
            println!("Unable to save cassette file:");
            println!("{}", err);
        }
    }

    if let Some(path) = matches.value_of("dsk_file") {
        if name.is_none() {
            println!("No name for the program specified, not creating disk file");
            return;
        }
        if let Err(err) = save_disk(path, &coco_file, append) {
            println!("Unable to save disk file:");
            println!("{}", err);
        }
    }
}

fn check_target(path: &str, append: bool) -> Result<(), ContainerError> {
    let exists = Path::new(path).exists();
    if exists && !append {
        return Err(ContainerError::FileExists(path.to_string()));
    }
    if append && !exists {
        return Err(ContainerError::FileNotFound(path.to_string()));
    }
    Ok(())
}

fn save_binary(path: &str, coco_file: &CoCoFile, append: bool) -> Result<(), ContainerError> {
    if append {
        return Err(ContainerError::Validation(format!(
            "[{}] cannot append to binary file",
            path
        )));
    }
    check_target(path, false)?;
    let mut container = BinaryFile::new();
    container.add_file(coco_file)?;
    cocofile::write_file(path, container.buffer())
}

fn save_cassette(path: &str, coco_file: &CoCoFile, append: bool) -> Result<(), ContainerError> {
    check_target(path, append)?;
    let mut container = if append {
        CassetteFile::from_buffer(cocofile::read_file(path)?)
    } else {
        CassetteFile::new()
    };
    container.add_file(coco_file)?;
    cocofile::write_file(path, container.buffer())
}

fn save_disk(path: &str, coco_file: &CoCoFile, append: bool) -> Result<(), ContainerError> {
    check_target(path, append)?;
    let mut container = if append {
        DiskFile::from_buffer(cocofile::read_file(path)?)
    } else {
        DiskFile::new()
    };
    container.add_file(coco_file)?;
    cocofile::write_file(path, container.buffer())
}
