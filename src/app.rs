//! Runs one invocation through the action pipeline

use crate::cli::Invocation;
use crate::commands::{ActionQueue, RunContext};
use crate::error::AppError;

/// Run every requested action
///
/// Actions that were allocated are released and the bootloader handle is
/// closed whether or not the run succeeds.
pub fn run(invocation: &Invocation, ctx: &mut RunContext) -> Result<(), AppError> {
    let mut queue = ActionQueue::new();
    let result = run_queue(invocation, ctx, &mut queue);
    queue.release_all();
    ctx.session.close();
    result
}

fn run_queue(
    invocation: &Invocation,
    ctx: &mut RunContext,
    queue: &mut ActionQueue,
) -> Result<(), AppError> {
    for serial_number in &invocation.serial_numbers {
        ctx.session.set_serial_filter(serial_number)?;
    }
    ctx.wait = invocation.wait;
    ctx.restart = invocation.restart;

    for request in &invocation.requests {
        queue.add(request.kind, request.argument.as_deref())?;
    }
    log::debug!("Queued {} action(s): {:?}", queue.len(), queue.names());

    if ctx.wait {
        log::debug!("Waiting for bootloader");
        let poller = ctx.poller;
        poller.wait(&mut ctx.session)?;
    }

    queue.prepare_all(ctx)?;
    queue.execute_all(ctx)?;

    if ctx.restart {
        let device = ctx.session.require()?;
        device
            .restart()
            .map_err(|source| AppError::Restart { source })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ActionKind, Cli};
    use crate::error::Status;
    use crate::session::{DeviceSession, WaitPoller};
    use clap::CommandFactory;
    use pload_core::{BootloaderCatalog, NoProgress};
    use pload_dummy::{DummyCatalog, DummyDevice, Event};
    use std::io::Write;
    use std::time::Duration;

    fn invocation(args: &[&str]) -> Invocation {
        let matches = Cli::command()
            .try_get_matches_from(std::iter::once("p-load").chain(args.iter().copied()))
            .unwrap();
        Invocation::from_matches(&matches).unwrap()
    }

    fn context(catalog: &DummyCatalog) -> RunContext {
        let session = DeviceSession::new(Box::new(catalog.clone()));
        let mut ctx = RunContext::new(session, Box::new(NoProgress));
        ctx.poller = WaitPoller {
            timeout: Duration::from_millis(20),
            interval: Duration::from_millis(1),
        };
        ctx
    }

    fn run_args(catalog: &DummyCatalog, args: &[&str]) -> Result<(), AppError> {
        let mut ctx = context(catalog);
        let result = run(&invocation(args), &mut ctx);
        assert!(!ctx.session.is_open());
        result
    }

    fn hex_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    const APP_HEX: &str = ":0420000001020304D2\n:00000001FF\n";

    #[test]
    fn test_flags_keep_command_line_order() {
        let inv = invocation(&[
            "--erase-flash",
            "--read-flash",
            "a.hex",
            "--list",
            "--write-eeprom",
            "b.hex",
            "--erase",
        ]);
        let kinds: Vec<ActionKind> = inv.requests.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::EraseProgram,
                ActionKind::ReadProgram,
                ActionKind::List,
                ActionKind::WriteData,
                ActionKind::EraseProgramAndData,
            ]
        );
        assert!(!inv.restart);
    }

    #[test]
    fn test_repeated_bare_flags_keep_order() {
        let inv = invocation(&["--erase", "--list", "--erase"]);
        let kinds: Vec<ActionKind> = inv.requests.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::EraseProgramAndData,
                ActionKind::List,
                ActionKind::EraseProgramAndData,
            ]
        );
    }

    #[test]
    fn test_write_and_restart_flag() {
        let inv = invocation(&["-w", "app.hex"]);
        assert_eq!(inv.requests.len(), 1);
        assert_eq!(inv.requests[0].kind, ActionKind::WriteProgramAndData);
        assert_eq!(
            inv.requests[0].argument.as_deref(),
            Some(std::path::Path::new("app.hex"))
        );
        assert!(inv.restart);
    }

    #[test]
    fn test_write_and_restart_runs() {
        let dir = tempfile::tempdir().unwrap();
        let app = hex_file(&dir, "app.hex", APP_HEX);
        let catalog = DummyCatalog::new();
        catalog.add(DummyDevice::new("A"));

        run_args(&catalog, &["-w", &app]).unwrap();

        assert_eq!(&catalog.program("A")[..4], &[1, 2, 3, 4]);
        assert_eq!(catalog.restarts("A"), 1);
        assert!(!catalog.is_open("A"));
    }

    #[test]
    fn test_no_device_means_no_file_io() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.hex");
        let catalog = DummyCatalog::new();

        let err = run_args(
            &catalog,
            &["--erase", "--read-flash", out.to_str().unwrap()],
        )
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound { serial_number: None }));
        assert_eq!(err.status(), Status::BootloaderNotFound);
        assert!(!out.exists());
    }

    #[test]
    fn test_read_flash_spans_program_window() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.hex");
        let catalog = DummyCatalog::new();
        catalog.add(DummyDevice::new("A").with_program(&[0x5A; 0x400]));

        run_args(&catalog, &["--read-flash", out.to_str().unwrap()]).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        let descriptor = catalog.discover(None).unwrap().remove(0);
        let image = pload_core::mapper::image_from_hex(&descriptor, &text).unwrap();
        assert!(image.program().iter().all(|&b| b == 0x5A));
        assert!(image.is_erased(pload_core::Region::Data));

        let first = text.lines().next().unwrap();
        assert!(first.starts_with(":10200000"));
    }

    #[test]
    fn test_erase_then_write_matches_write_onto_erased() {
        let dir = tempfile::tempdir().unwrap();
        let app = hex_file(&dir, "app.hex", APP_HEX);

        let erased_first = DummyCatalog::new();
        erased_first.add(DummyDevice::new("A").with_program(&[0x77; 0x400]));
        run_args(&erased_first, &["--erase", "--write", &app]).unwrap();

        let fresh = DummyCatalog::new();
        fresh.add(DummyDevice::new("A"));
        run_args(&fresh, &["--write", &app]).unwrap();

        assert_eq!(erased_first.program("A"), fresh.program("A"));
        assert_eq!(erased_first.data("A"), fresh.data("A"));
    }

    #[test]
    fn test_prepare_failure_skips_every_execute() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.hex");
        let catalog = DummyCatalog::new();
        catalog.add(DummyDevice::new("A").with_program(&[0x77; 16]));

        let err = run_args(
            &catalog,
            &["--erase-flash", "--write-flash", missing.to_str().unwrap()],
        )
        .unwrap_err();

        assert!(matches!(err, AppError::File { .. }));
        assert_eq!(err.status(), Status::OperationFailed);
        assert!(!catalog
            .events()
            .iter()
            .any(|e| matches!(e, Event::WriteProgram(_))));
        assert_eq!(&catalog.program("A")[..16], &[0x77; 16]);
    }

    #[test]
    fn test_record_outside_memory_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = hex_file(&dir, "far.hex", ":0400000001020304F2\n:00000001FF\n");
        let catalog = DummyCatalog::new();
        catalog.add(DummyDevice::new("A"));

        let err = run_args(&catalog, &["--write-flash", &app]).unwrap_err();

        assert!(matches!(err, AppError::Image { .. }));
        assert!(err.to_string().contains("far.hex"));
    }

    #[test]
    fn test_serial_number_twice() {
        let catalog = DummyCatalog::new();
        let err = run_args(&catalog, &["-d", "A", "-d", "B", "--list"]).unwrap_err();
        assert_eq!(err.status(), Status::BadArguments);
    }

    #[test]
    fn test_list_without_devices_status() {
        let catalog = DummyCatalog::new();
        let err = run_args(&catalog, &["--list"]).unwrap_err();
        assert!(matches!(err, AppError::NoneListed { .. }));
        assert_eq!(err.status(), Status::BootloaderNotFound);
    }

    #[test]
    fn test_restart_failure() {
        let catalog = DummyCatalog::new();
        catalog.add(DummyDevice::new("A").failing_restart());
        let err = run_args(&catalog, &["--restart"]).unwrap_err();
        assert!(matches!(err, AppError::Restart { .. }));
        assert_eq!(err.status(), Status::OperationFailed);
    }

    #[test]
    fn test_ambiguous_devices() {
        let catalog = DummyCatalog::new();
        catalog.add(DummyDevice::new("A")).add(DummyDevice::new("B"));
        let err = run_args(&catalog, &["--erase"]).unwrap_err();
        assert!(matches!(err, AppError::Ambiguous { count: 2 }));
        assert_eq!(catalog.opens(), 0);

        run_args(&catalog, &["-d", "B", "--erase"]).unwrap();
    }

    #[test]
    fn test_wait_for_device() {
        let catalog = DummyCatalog::new();
        catalog.add(DummyDevice::new("A").appearing_after(2));
        run_args(&catalog, &["--wait", "--erase-flash"]).unwrap();
        assert!(catalog.discoveries() >= 3);
    }

    #[test]
    fn test_wait_times_out() {
        let catalog = DummyCatalog::new();
        let err = run_args(&catalog, &["-d", "X", "--wait"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No bootloader found with serial number 'X'."
        );
    }
}
