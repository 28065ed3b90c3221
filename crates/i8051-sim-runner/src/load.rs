//! Program images: hex listings and raw binaries.

use std::fs;
use std::io;
use std::path::Path;

use i8051_sim::{AddressSpace, MemoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: `{token}` is not a hex byte")]
    BadToken { line: usize, token: String },
    #[error("program of {size} bytes does not fit in code space")]
    TooLarge {
        size: usize,
        #[source]
        source: MemoryError,
    },
}

/// Parse a hex listing: whitespace-separated bytes written as `0xHH` or
/// `HH`, with `;` and `//` starting a comment that runs to end of line.
pub fn parse_listing(text: &str) -> Result<Vec<u8>, LoadError> {
    let mut bytes = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = strip_comment(line);
        for token in line.split_whitespace() {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty()
                || digits.len() > 2
                || !digits.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(bad_token(index, token));
            }
            let byte = u8::from_str_radix(digits, 16).map_err(|_| bad_token(index, token))?;
            bytes.push(byte);
        }
    }
    Ok(bytes)
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find(';'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

fn bad_token(index: usize, token: &str) -> LoadError {
    LoadError::BadToken {
        line: index + 1,
        token: token.to_string(),
    }
}

/// Read a program file and return its bytes.
pub fn read_program(path: &Path, binary: bool) -> Result<Vec<u8>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: path.display().to_string(),
        source,
    };
    if binary {
        fs::read(path).map_err(io_err)
    } else {
        let text = fs::read_to_string(path).map_err(io_err)?;
        parse_listing(&text)
    }
}

/// Place `program` in code space starting at address 0.
pub fn install(memory: &mut AddressSpace, program: &[u8]) -> Result<(), LoadError> {
    memory
        .load_code(0, program)
        .map_err(|source| LoadError::TooLarge {
            size: program.len(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use i8051_sim::MemoryConfig;

    #[test]
    fn one_byte_per_line() {
        let text = "0xE4\n0x74\n0x56\n0xFF\n";
        assert_eq!(parse_listing(text).unwrap(), vec![0xE4, 0x74, 0x56, 0xFF]);
    }

    #[test]
    fn mixed_spacing_prefixes_and_comments() {
        let text = "  0x74 56   ; MOV A,#56H\n\n// nothing here\n0Xd2\t90 // SETB P1.0\nff";
        assert_eq!(
            parse_listing(text).unwrap(),
            vec![0x74, 0x56, 0xD2, 0x90, 0xFF]
        );
    }

    #[test]
    fn rejects_bad_tokens_with_line_number() {
        let err = parse_listing("0xE4\n0x1G\n").unwrap_err();
        assert!(matches!(err, LoadError::BadToken { line: 2, ref token } if token == "0x1G"));
        assert_eq!(err.to_string(), "line 2: `0x1G` is not a hex byte");

        assert!(matches!(
            parse_listing("0x123").unwrap_err(),
            LoadError::BadToken { line: 1, .. }
        ));
        assert!(matches!(
            parse_listing("0x").unwrap_err(),
            LoadError::BadToken { line: 1, .. }
        ));
        assert!(matches!(
            parse_listing("+1").unwrap_err(),
            LoadError::BadToken { line: 1, .. }
        ));
    }

    #[test]
    fn install_checks_size() {
        let mut memory = AddressSpace::new(MemoryConfig {
            code_size: 2,
            data_size: 8,
        })
        .unwrap();
        assert!(matches!(
            install(&mut memory, &[1, 2, 3]),
            Err(LoadError::TooLarge { size: 3, .. })
        ));
        install(&mut memory, &[1, 2]).unwrap();
        assert_eq!(memory.code(), &[1, 2]);
    }
}
