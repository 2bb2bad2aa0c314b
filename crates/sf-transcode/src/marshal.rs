//! Moving command-line arguments across the native call boundary.

use crate::engine::{EngineMemory, MAX_C_STRING, POINTER_SIZE};

/// Prefix of every command: program name placeholder and the flags that
/// keep ffmpeg non-interactive.
pub const DEFAULT_ARGS: [&str; 3] = ["./ffmpeg", "-nostdin", "-y"];

/// Prepend [`DEFAULT_ARGS`] to the caller's arguments, dropping empty ones.
pub fn build_argv<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    DEFAULT_ARGS
        .iter()
        .map(|s| s.to_string())
        .chain(args.into_iter().map(Into::into))
        .filter(|a| !a.is_empty())
        .collect()
}

/// Copy `argv` into engine memory as NUL-terminated strings plus an array
/// of pointers to them. Returns `(argc, argv_ptr)`.
///
/// Arguments containing NUL or longer than [`MAX_C_STRING`] bytes are
/// rejected before anything is written, since the engine could not read
/// them back intact.
pub fn marshal_args(memory: &dyn EngineMemory, argv: &[String]) -> sf_core::Result<(i32, u32)> {
    let argc = i32::try_from(argv.len())
        .map_err(|_| sf_core::Error::Validation(format!("too many arguments: {}", argv.len())))?;
    for (i, arg) in argv.iter().enumerate() {
        if arg.contains('\0') {
            return Err(sf_core::Error::Validation(format!(
                "argument {i} contains a NUL byte"
            )));
        }
        if arg.len() > MAX_C_STRING {
            return Err(sf_core::Error::Validation(format!(
                "argument {i} is {} bytes long, the limit is {MAX_C_STRING}",
                arg.len()
            )));
        }
    }
    let table = memory.malloc(argv.len() * POINTER_SIZE)?;

    for (i, arg) in argv.iter().enumerate() {
        let mut buf = Vec::with_capacity(arg.len() + 1);
        buf.extend_from_slice(arg.as_bytes());
        buf.push(0);

        let ptr = memory.malloc(buf.len())?;
        memory.write(ptr, &buf)?;
        memory.set_i32(table + (i * POINTER_SIZE) as u32, ptr as i32)?;
    }

    Ok((argc, table))
}

/// Read back what [`marshal_args`] wrote.
pub fn unmarshal_args(memory: &dyn EngineMemory, argc: i32, argv: u32) -> sf_core::Result<Vec<String>> {
    if argc < 0 {
        return Err(sf_core::Error::Engine(format!("negative argc: {argc}")));
    }
    (0..argc as usize)
        .map(|i| {
            let ptr = memory.get_i32(argv + (i * POINTER_SIZE) as u32)?;
            memory.read_c_string(ptr as u32)
        })
        .collect()
}
