use crate::command::ExitCode;
use crate::env::Environment;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// Exit code reported when a program cannot be found.
pub const EXIT_NOT_FOUND: ExitCode = 127;

/// Exit code reported when a program was found but could not be executed.
pub const EXIT_NOT_EXECUTABLE: ExitCode = 126;

/// Prepares a [`Command`] for an argument vector.
///
/// The program is resolved with [`find_command_path`] against `PATH` and the working
/// directory of `env`. A name that does not resolve is handed to the system as typed,
/// so spawning fails with the operating system's reason. `argv[0]` is passed to the
/// program as typed. The child sees exactly the variables in `env` and starts in
/// `env.current_dir`.
///
/// Standard streams are left at their defaults (inherited) for the caller to override.
pub fn prepare_command(argv: &[String], env: &Environment) -> io::Result<Command> {
    let (name, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument list"))?;
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let program = find_command_path(OsStr::new(search_paths), Path::new(name), &env.current_dir)
        .unwrap_or_else(|| PathBuf::from(name));

    let mut cmd = Command::new(program);
    cmd.arg0(name)
        .args(args)
        .env_clear()
        .envs(&env.vars)
        .current_dir(&env.current_dir);
    Ok(cmd)
}

/// Converts a child's exit status to a shell exit code.
///
/// Termination by a signal is reported as `128 + signal`.
pub fn exit_code(exit_status: ExitStatus) -> ExitCode {
    match exit_status.code() {
        Some(x) => x,
        None => terminated_by_signal(exit_status),
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

/// Exit code for a program that failed to start with `err`.
pub fn spawn_failure_code(err: &io::Error) -> ExitCode {
    match err.kind() {
        io::ErrorKind::NotFound => EXIT_NOT_FOUND,
        io::ErrorKind::PermissionDenied => EXIT_NOT_EXECUTABLE,
        _ => 1,
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Path with more than one component (e.g., `bin/sh` or `./foo`): resolved against
///   `current_dir`, returned if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first match that has an execute bit set.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, path: &Path, current_dir: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path.to_path_buf());
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) if !path.starts_with(".") => find_in_path(search_paths, x.as_os_str()),
        _ => find_by_path(current_dir.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .filter_map(|dir| find_by_path(dir.join(cmd)))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.permissions().mode() & 0o111 != 0)
}

fn find_by_path(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path, Path::new("/"));
        assert_eq!(found.as_deref(), Some(path));
    }

    #[test]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(osstr("/bin"), path, Path::new("/"));
        assert!(res.is_none(), "Expected not to find /bin/nonexisting via absolute path");
    }

    #[test]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nowhere:/bin"), Path::new("sh"), Path::new("/"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found, Path::new("/bin/sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("nonexisting"), Path::new("/"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    fn single_component_ignores_current_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        File::create(tmp.path().join("foo")).expect("touch foo");
        let res = find_command_path(osstr("/bin"), Path::new("foo"), tmp.path());
        assert!(res.is_none());
    }

    #[test]
    fn relative_paths_resolve_against_current_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join("bin")).expect("create bin dir");
        File::create(tmp.path().join("bin").join("sh")).expect("touch bin/sh");
        File::create(tmp.path().join("foo")).expect("touch foo");

        let found = find_command_path(osstr("/does/not/matter"), Path::new("bin/sh"), tmp.path());
        assert_eq!(found, Some(tmp.path().join("bin/sh")));

        let found = find_command_path(osstr("/bin"), Path::new("./foo"), tmp.path());
        assert_eq!(found, Some(tmp.path().join("./foo")));
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(osstr("/bin"), Path::new(""), Path::new("/"));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    #[test]
    fn directories_are_not_commands() {
        let res = find_command_path(osstr("/"), Path::new("bin"), Path::new("/"));
        assert!(res.is_none());
    }

    #[test]
    fn path_search_skips_files_without_execute_bit() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (first, second) = (tmp.path().join("a"), tmp.path().join("b"));
        for (dir, mode) in [(&first, 0o644), (&second, 0o755)] {
            fs::create_dir(dir).expect("create dir");
            File::create(dir.join("tool")).expect("touch tool");
            fs::set_permissions(dir.join("tool"), fs::Permissions::from_mode(mode)).expect("chmod");
        }

        let search = std::env::join_paths([&first, &second]).expect("join paths");
        let found = find_command_path(&search, Path::new("tool"), Path::new("/"));
        assert_eq!(found, Some(second.join("tool")));

        let search = std::env::join_paths([&first]).expect("join paths");
        assert!(find_command_path(&search, Path::new("tool"), Path::new("/")).is_none());
    }

    #[test]
    fn unknown_programs_fail_to_spawn_with_the_os_error() {
        let env = Environment::new();
        let mut cmd = prepare_command(&["definitely-not-a-real-program-xsh".to_owned()], &env)
            .expect("command is prepared");
        let err = cmd.spawn().expect_err("spawn should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.raw_os_error().is_some());
        assert_eq!(spawn_failure_code(&err), EXIT_NOT_FOUND);
    }

    #[test]
    fn prepare_command_keeps_argv0() {
        let env = Environment::new();
        let cmd = prepare_command(&["sh".to_owned(), "-c".to_owned(), "true".to_owned()], &env)
            .expect("sh should be on PATH");
        assert!(Path::new(cmd.get_program()).is_absolute());
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec![OsStr::new("-c"), OsStr::new("true")]);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // killed by SIGKILL
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }
}
