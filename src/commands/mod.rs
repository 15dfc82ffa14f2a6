//! Action pipeline
//!
//! Every action flag on the command line becomes one [`Action`] in an
//! [`ActionQueue`]. A run then goes through the queue in stages:
//!
//! 1. `parse` right after the action is allocated, with the flag's argument
//! 2. `prepare` for every action, in order (load hex files, create output
//!    files)
//! 3. `execute` for every action, in order (talk to the device)
//! 4. `release` for every allocated action, whatever happened before
//!
//! A failing stage stops the remaining actions of that stage and every later
//! stage except `release`.

mod list;
mod read;
mod write;

use std::path::Path;

use pload_core::{Progress, Regions};

use crate::cli::ActionKind;
use crate::error::AppError;
use crate::session::{DeviceSession, WaitPoller};

pub use list::{List, ListSupported};
pub use read::ReadImage;
pub use write::WriteImage;

/// State threaded through every stage of a run
pub struct RunContext {
    pub session: DeviceSession,
    /// Wait for a bootloader to appear before preparing
    pub wait: bool,
    /// Restart the device after all actions executed
    pub restart: bool,
    pub poller: WaitPoller,
    pub progress: Box<dyn Progress>,
}

impl RunContext {
    pub fn new(session: DeviceSession, progress: Box<dyn Progress>) -> Self {
        Self {
            session,
            wait: false,
            restart: false,
            poller: WaitPoller::default(),
            progress,
        }
    }
}

/// One queued operation
///
/// Every stage defaults to doing nothing.
pub trait Action {
    /// Flag that queued the action
    fn name(&self) -> &'static str;

    /// Consume the flag's argument
    fn parse(&mut self, _argument: Option<&Path>) -> Result<(), AppError> {
        Ok(())
    }

    fn prepare(&mut self, _ctx: &mut RunContext) -> Result<(), AppError> {
        Ok(())
    }

    fn execute(&mut self, _ctx: &mut RunContext) -> Result<(), AppError> {
        Ok(())
    }

    /// Drop per-invocation resources. Called exactly once.
    fn release(&mut self) {}
}

/// Create the action for a flag
pub fn allocate(kind: ActionKind) -> Result<Box<dyn Action>, AppError> {
    let flag = kind.flag();
    let action: Box<dyn Action> = match kind {
        ActionKind::List => Box::new(List),
        ActionKind::ListSupported => Box::new(ListSupported),
        ActionKind::WriteProgramAndData => Box::new(WriteImage::from_file(flag, Regions::ProgramAndData)),
        ActionKind::WriteProgram => Box::new(WriteImage::from_file(flag, Regions::Program)),
        ActionKind::WriteData => Box::new(WriteImage::from_file(flag, Regions::Data)),
        ActionKind::EraseProgramAndData => Box::new(WriteImage::erase(flag, Regions::ProgramAndData)),
        ActionKind::EraseProgram => Box::new(WriteImage::erase(flag, Regions::Program)),
        ActionKind::EraseData => Box::new(WriteImage::erase(flag, Regions::Data)),
        ActionKind::ReadProgramAndData => Box::new(ReadImage::new(flag, Regions::ProgramAndData)),
        ActionKind::ReadProgram => Box::new(ReadImage::new(flag, Regions::Program)),
        ActionKind::ReadData => Box::new(ReadImage::new(flag, Regions::Data)),
    };
    Ok(action)
}

/// Ordered list of actions
///
/// Actions run in insertion order. Every action that was added is released
/// exactly once, by [`ActionQueue::release_all`] or on drop.
#[derive(Default)]
pub struct ActionQueue {
    actions: Vec<Box<dyn Action>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an action, queue it and let it parse its argument
    pub fn add(&mut self, kind: ActionKind, argument: Option<&Path>) -> Result<(), AppError> {
        let action = allocate(kind)?;
        self.push(action, argument)
    }

    /// Queue an already allocated action and let it parse its argument
    pub fn push(&mut self, mut action: Box<dyn Action>, argument: Option<&Path>) -> Result<(), AppError> {
        let parsed = action.parse(argument);
        self.actions.push(action);
        parsed
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    pub fn prepare_all(&mut self, ctx: &mut RunContext) -> Result<(), AppError> {
        for action in &mut self.actions {
            log::debug!("Preparing {}", action.name());
            action.prepare(ctx)?;
        }
        Ok(())
    }

    pub fn execute_all(&mut self, ctx: &mut RunContext) -> Result<(), AppError> {
        for action in &mut self.actions {
            log::debug!("Executing {}", action.name());
            action.execute(ctx)?;
        }
        Ok(())
    }

    pub fn release_all(&mut self) {
        for mut action in self.actions.drain(..) {
            action.release();
        }
    }
}

impl Drop for ActionQueue {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pload_core::NoProgress;
    use pload_dummy::DummyCatalog;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        id: usize,
        fail_prepare: bool,
        log: Log,
    }

    impl Recorder {
        fn boxed(id: usize, fail_prepare: bool, log: &Log) -> Box<dyn Action> {
            Box::new(Self {
                id,
                fail_prepare,
                log: Rc::clone(log),
            })
        }
    }

    impl Action for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn prepare(&mut self, _ctx: &mut RunContext) -> Result<(), AppError> {
            self.log.borrow_mut().push(format!("prepare {}", self.id));
            if self.fail_prepare {
                return Err(AppError::BadArguments("prepare failed".into()));
            }
            Ok(())
        }

        fn execute(&mut self, _ctx: &mut RunContext) -> Result<(), AppError> {
            self.log.borrow_mut().push(format!("execute {}", self.id));
            Ok(())
        }

        fn release(&mut self) {
            self.log.borrow_mut().push(format!("release {}", self.id));
        }
    }

    fn context() -> RunContext {
        let session = DeviceSession::new(Box::new(DummyCatalog::new()));
        RunContext::new(session, Box::new(NoProgress))
    }

    #[test]
    fn test_prepare_failure_skips_execute_and_releases_all() {
        let log = Log::default();
        let mut queue = ActionQueue::new();
        queue.push(Recorder::boxed(0, false, &log), None).unwrap();
        queue.push(Recorder::boxed(1, true, &log), None).unwrap();
        queue.push(Recorder::boxed(2, false, &log), None).unwrap();

        let mut ctx = context();
        let result = queue
            .prepare_all(&mut ctx)
            .and_then(|()| queue.execute_all(&mut ctx));
        assert!(result.is_err());
        queue.release_all();

        assert_eq!(
            *log.borrow(),
            vec!["prepare 0", "prepare 1", "release 0", "release 1", "release 2"]
        );
    }

    #[test]
    fn test_release_runs_once_even_when_dropped() {
        let log = Log::default();
        {
            let mut queue = ActionQueue::new();
            queue.push(Recorder::boxed(0, false, &log), None).unwrap();
            queue.release_all();
        }
        {
            let mut queue = ActionQueue::new();
            queue.push(Recorder::boxed(1, false, &log), None).unwrap();
        }
        assert_eq!(*log.borrow(), vec!["release 0", "release 1"]);
    }

    #[test]
    fn test_stages_run_in_order() {
        let log = Log::default();
        let mut queue = ActionQueue::new();
        queue.push(Recorder::boxed(0, false, &log), None).unwrap();
        queue.push(Recorder::boxed(1, false, &log), None).unwrap();

        let mut ctx = context();
        queue.prepare_all(&mut ctx).unwrap();
        queue.execute_all(&mut ctx).unwrap();
        queue.release_all();

        assert_eq!(
            *log.borrow(),
            vec!["prepare 0", "prepare 1", "execute 0", "execute 1", "release 0", "release 1"]
        );
    }

    #[test]
    fn test_missing_file_argument() {
        let mut queue = ActionQueue::new();
        let err = queue.add(ActionKind::WriteProgram, None).unwrap_err();
        assert_eq!(err.to_string(), "Expected a filename after --write-flash.");
        // The action is queued so that it still gets released
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_no_deduplication() {
        let mut queue = ActionQueue::new();
        queue.add(ActionKind::EraseProgram, None).unwrap();
        queue.add(ActionKind::EraseProgram, None).unwrap();
        assert_eq!(queue.names(), vec!["--erase-flash", "--erase-flash"]);
    }
}
