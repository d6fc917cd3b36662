use std::path::Path;

use anyhow::{bail, Context};
use serde::Serialize;

use crate::{app::GlobalOptions, commands::start_runtime, output::print_output};

pub struct InvokeOptions<'a> {
    pub assembly: &'a Path,
    pub name: &'a str,
    pub method: Option<&'a str>,
    pub input: Option<&'a Path>,
    pub hex: Option<&'a str>,
    pub separator: char,
    pub show_buffer: bool,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
struct InvokeOutput {
    backend: String,
    assembly: String,
    function: String,
    length: usize,
    result: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    buffer: Option<String>,
}

pub fn run(options: &Path, invoke: &InvokeOptions<'_>) -> anyhow::Result<()> {
    let mut buffer = match (invoke.input, invoke.hex) {
        (Some(path), _) => std::fs::read(path)
            .with_context(|| format!("failed to read input: {}", path.display()))?,
        (None, Some(hex)) => parse_hex(hex)?,
        (None, None) => Vec::new(),
    };

    let runtime = start_runtime(options)?;
    let assembly = runtime
        .get_assembly(invoke.assembly)
        .with_separator(invoke.separator);
    let function = assembly
        .get_function(invoke.name, invoke.method)
        .with_context(|| format!("failed to resolve {}", invoke.name))?;

    log::debug!("calling {function} with {} bytes", buffer.len());
    let result = function.invoke(&mut buffer);

    let output = InvokeOutput {
        backend: runtime.kind().to_string(),
        assembly: invoke.assembly.display().to_string(),
        function: format!("{}::{}", function.type_name(), function.method_name()),
        length: buffer.len(),
        result,
        buffer: invoke.show_buffer.then(|| to_hex(&buffer)),
    };

    print_output(&output, invoke.global, |out| {
        println!("Function:  {}", out.function);
        println!("Backend:   {}", out.backend);
        println!("Buffer:    {} bytes", out.length);
        println!("Result:    {}", out.result);
        if invoke.show_buffer {
            println!();
            println!("Hex:       {}", to_hex(&buffer));
            println!("Text:      {}", String::from_utf8_lossy(&buffer));
        }
    })
}

/// Parses hex bytes, ignoring whitespace and an optional `0x` prefix.
fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        bail!("hex input has an odd number of digits");
    }

    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair)?;
            u8::from_str_radix(text, 16).with_context(|| format!("invalid hex byte '{text}'"))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_prefix_and_spaces() {
        assert_eq!(parse_hex("0x68 65 6c6c 6f").unwrap(), b"hello");
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(parse_hex("FF00").unwrap(), vec![0xff, 0x00]);
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn to_hex_is_lowercase() {
        assert_eq!(to_hex(&[0xde, 0xad, 0x01]), "dead01");
    }
}
