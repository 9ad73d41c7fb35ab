#[macro_use]
extern crate clap;

use clap::Arg;
use cocofile::binary::BinaryFile;
use cocofile::{open_container, CoCoFile, Container, ContainerError};
use log::debug;
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();

    let matches = app_from_crate!()
        .arg(
            Arg::with_name("HOST_FILE")
                .help("the host file to process (DSK, CAS, etc)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("list")
                .long("list")
                .help("list all of the files on the specified host file"),
        )
        .arg(
            Arg::with_name("to_bin")
                .long("to_bin")
                .help("extracts all the files from the host file, and saves them as BIN files"),
        )
        .arg(
            Arg::with_name("files")
                .long("files")
                .takes_value(true)
                .multiple(true)
                .value_name("FILE")
                .help("list of file names to extract"),
        )
        .arg(
            Arg::with_name("append")
                .long("append")
                .help("append to host file if it already exists"),
        )
        .get_matches();

    let host_filename = matches.value_of("HOST_FILE").unwrap();
    let filenames: Option<Vec<String>> = matches
        .values_of("files")
        .map(|values| values.map(str::to_uppercase).collect());

    let buffer = match cocofile::read_file(host_filename) {
        Ok(buffer) => buffer,
        Err(err) => {
            println!("{}", err);
            process::exit(1);
        }
    };

    let container = match open_container(buffer) {
        Ok(container) => container,
        Err(_) => {
            println!(
                "Unable to determine file type for file [{}]",
                host_filename
            );
            process::exit(1);
        }
    };

    let files = match container.list_files() {
        Ok(files) => files,
        Err(err) => {
            println!("{}", err);
            process::exit(1);
        }
    };

    if matches.is_present("list") {
        for (number, file) in files.iter().enumerate() {
            println!("-- File #{} --", number + 1);
            println!("{}", file);
        }
        return;
    }

    if matches.is_present("to_bin") {
        let append = matches.is_present("append");
        for (number, file) in files.iter().enumerate() {
            let filename = file.name.trim().replace('\0', "");
            let wanted = filenames
                .as_ref()
                .map_or(true, |names| names.contains(&filename));
            if !wanted {
                debug!("skipping [{}]", filename);
                continue;
            }
            let binary_file_name = format!("{}.bin", filename);
            println!("-- File #{} [{}] --", number + 1, filename);
            match save_binary(&binary_file_name, file, append) {
                Ok(()) => println!("Saved as {}", binary_file_name),
                Err(err) => {
                    println!("Unable to save binary file [{}]:", binary_file_name);
                    println!("{}", err);
                }
            }
        }
    }
}

fn save_binary(path: &str, file: &CoCoFile, append: bool) -> Result<(), ContainerError> {
    if append {
        return Err(ContainerError::Validation(format!(
            "[{}] cannot append to binary file",
            path
        )));
    }
    if Path::new(path).exists() {
        return Err(ContainerError::FileExists(path.to_string()));
    }
    let mut container = BinaryFile::new();
    container.add_file(file)?;
    cocofile::write_file(path, container.buffer())
}
