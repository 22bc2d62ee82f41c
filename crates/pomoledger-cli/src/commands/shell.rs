//! Interactive pomodoro shell.
//!
//! Lines are read from stdin and dispatched to the session controller.
//! Timer progress and lifecycle notices arrive on the controller's event
//! channel and are rendered by a separate console thread.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};

use pomoledger_core::{
    format_hms, render_project_list, CommittedSession, Config, CoreError, Database, EndReason,
    Event, NewSession, SessionController, SessionPhase, StepType,
};

use super::open_database;

const PROMPT: &str = "(pomoledger) ";

const HELP: &str = "\
Commands:
  start [project]  start a pomodoro (asks for the project when omitted)
  pause            pause the running pomodoro
  resume           resume a paused pomodoro
  stop             stop the current interval and record its time
  <Enter>          start the break once a pomodoro is complete
  retry            record a session that failed to save
  list             show active projects and their times
  add <project>    register a project
  status           show the current interval
  help             show this help
  exit, quit       leave the shell";

/// Shared stdout. Progress redraws one line in place; messages always start
/// on a fresh line.
#[derive(Default)]
struct Console {
    progress_open: Mutex<bool>,
}

impl Console {
    fn say(&self, message: &str) {
        let mut open = self
            .progress_open
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut out = io::stdout().lock();
        if *open {
            let _ = writeln!(out);
            *open = false;
        }
        let _ = writeln!(out, "{message}");
    }

    fn progress(&self, line: &str) {
        let mut open = self
            .progress_open
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut out = io::stdout().lock();
        let _ = write!(out, "\r{line}");
        let _ = out.flush();
        *open = true;
    }

    fn prompt(&self, text: &str) {
        let mut open = self
            .progress_open
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut out = io::stdout().lock();
        if *open {
            let _ = writeln!(out);
            *open = false;
        }
        let _ = write!(out, "{text}");
        let _ = out.flush();
    }
}

fn render_events(events: Receiver<Event>, console: &Console) {
    let mut after_break = false;
    for event in events {
        match &event {
            Event::Tick { .. } => {
                if let Some(line) = event.progress_line() {
                    console.progress(&line);
                }
            }
            Event::AwaitingBreak {
                project,
                elapsed_secs,
                ..
            } => console.say(&format!(
                "Pomodoro for '{project}' complete after {}. Press Enter to start the break; \
                 time keeps counting until you do.",
                format_hms(*elapsed_secs)
            )),
            Event::BreakFinished { .. } => {
                after_break = true;
                console.say("Break over.");
            }
            Event::FocusStarted { project, .. } if after_break => {
                after_break = false;
                console.say(&format!("Back to work on '{project}'."));
            }
            _ => {}
        }
    }
}

enum Flow {
    Continue,
    Exit,
}

struct Shell {
    controller: SessionController<Database>,
    console: Arc<Console>,
    interactive: bool,
    /// A finished interval the store refused, kept for `retry`.
    unsaved: Option<(NewSession, EndReason)>,
}

/// Run the shell until `exit` or end of input. With `project`, a focus
/// interval is started before the first prompt.
pub fn run(project: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = open_database(&config)?;
    let controller = SessionController::new(db, config.intervals());

    let console = Arc::new(Console::default());
    let events = controller.subscribe();
    let renderer = Arc::clone(&console);
    std::thread::Builder::new()
        .name("pomoledger-console".into())
        .spawn(move || render_events(events, &renderer))?;

    let mut shell = Shell {
        controller,
        console,
        interactive: io::stdin().is_terminal(),
        unsaved: None,
    };
    let mut input = io::stdin().lock().lines();

    shell.say("Pomodoro tracker. Type help to list commands.");
    shell.list();
    if let Some(project) = project {
        shell.start(&project);
    }

    loop {
        if shell.interactive {
            shell.console.prompt(PROMPT);
        }
        let Some(line) = input.next() else {
            shell.end_of_input();
            break;
        };
        if let Flow::Exit = shell.execute(line?.trim(), &mut input)? {
            break;
        }
    }
    Ok(())
}

impl Shell {
    fn say(&self, message: &str) {
        self.console.say(message);
    }

    fn execute(
        &mut self,
        line: &str,
        input: &mut impl Iterator<Item = io::Result<String>>,
    ) -> io::Result<Flow> {
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        tracing::debug!(command, "shell command");

        match command {
            "" => self.confirm_break(),
            "start" => {
                let project = if arg.is_empty() {
                    self.console.prompt("Project name: ");
                    input.next().transpose()?.unwrap_or_default()
                } else {
                    arg.to_string()
                };
                self.start(&project);
            }
            "pause" => match self.controller.pause() {
                Ok(()) => self.say("Paused."),
                Err(e) => self.say(&e.to_string()),
            },
            "resume" => match self.controller.resume() {
                Ok(()) => self.say("Resumed."),
                Err(e) => self.say(&e.to_string()),
            },
            "stop" => {
                let result = self.controller.stop();
                self.settle(result);
            }
            "retry" => self.retry(),
            "list" => self.list(),
            "add" => self.add(arg),
            "status" => self.status(),
            "help" | "?" => self.say(HELP),
            "exit" | "quit" => return Ok(self.exit()),
            other => self.say(&format!(
                "Unknown command: {other}. Type 'help' to list commands."
            )),
        }
        Ok(Flow::Continue)
    }

    fn start(&mut self, project: &str) {
        match self.controller.start_focus(project) {
            Ok(()) => self.say(&format!(
                "Started pomodoro for '{}'. Type 'pause', 'resume', or 'stop' to control.",
                project.trim()
            )),
            Err(e) => self.say(&e.to_string()),
        }
    }

    fn confirm_break(&mut self) {
        match self.controller.confirm_break() {
            Ok(committed) => {
                self.report(&committed);
                self.say(&format!(
                    "Break started ({}).",
                    format_hms(self.controller.intervals().break_secs)
                ));
            }
            // A bare Enter outside the awaiting-break state does nothing.
            Err(CoreError::NoActiveSession) => {}
            Err(e) => self.fail(e),
        }
    }

    fn settle(&mut self, result: Result<CommittedSession, CoreError>) {
        match result {
            Ok(committed) => self.report(&committed),
            Err(e) => self.fail(e),
        }
    }

    fn report(&self, committed: &CommittedSession) {
        let session = &committed.session;
        let duration = format_hms(session.duration_secs);
        let message = match session.step_type {
            StepType::Focus => format!(
                "Session for '{}' {}. Duration {duration}.",
                session.project_name,
                committed.reason.as_str()
            ),
            StepType::Break => format!(
                "Break {}. Duration {duration}.",
                committed.reason.as_str()
            ),
        };
        self.say(&message);
    }

    fn fail(&mut self, err: CoreError) {
        self.say(&err.to_string());
        if let CoreError::CommitFailed { draft, reason, .. } = err {
            self.say("Type 'retry' to try recording it again.");
            self.unsaved = Some((draft, reason));
        }
    }

    fn retry(&mut self) {
        let Some((draft, reason)) = self.unsaved.take() else {
            self.say("Nothing to retry.");
            return;
        };
        let result = self.controller.recommit(draft, reason);
        self.settle(result);
    }

    fn list(&self) {
        match self.controller.list_active_projects() {
            Ok(projects) => self.say(&render_project_list(&projects)),
            Err(e) => self.say(&format!("error: {e}")),
        }
    }

    fn add(&self, project: &str) {
        match self.controller.add_project(project) {
            Ok(true) => self.say(&format!("Project '{project}' added.")),
            Ok(false) => self.say(&format!("Project '{project}' already exists.")),
            Err(e) => self.say(&e.to_string()),
        }
    }

    fn status(&self) {
        let status = self.controller.status();
        let project = status.project.unwrap_or_default();
        let elapsed = format_hms(status.elapsed_secs);
        let left = if status.remaining_secs >= 0 {
            format!("{} left", format_hms(status.remaining_secs.unsigned_abs()))
        } else {
            format!("{} over", format_hms(status.remaining_secs.unsigned_abs()))
        };
        let message = match status.phase {
            SessionPhase::Idle => "No session running.".to_string(),
            SessionPhase::FocusRunning if status.paused => {
                format!("Focus on '{project}' paused at {elapsed}, {left}.")
            }
            SessionPhase::FocusRunning => format!("Focus on '{project}': {elapsed}, {left}."),
            SessionPhase::FocusAwaitingBreak => format!(
                "Focus on '{project}' complete: {elapsed}, {left}. Press Enter to start the break."
            ),
            SessionPhase::BreakRunning => format!("Break: {elapsed}, {left}."),
        };
        self.say(&message);
    }

    fn exit(&mut self) -> Flow {
        if self.controller.is_active() {
            self.say("Stop the running session before exiting.");
            return Flow::Continue;
        }
        if let Some((draft, _)) = self.unsaved.take() {
            tracing::warn!(
                project = %draft.project_name,
                duration_secs = draft.duration_secs,
                "discarding unrecorded session"
            );
            self.say(&format!(
                "Discarding unrecorded session for '{}' ({}).",
                draft.project_name,
                format_hms(draft.duration_secs)
            ));
        }
        Flow::Exit
    }

    /// Input closed: commit whatever is running, then leave.
    fn end_of_input(&mut self) {
        self.say("");
        if self.controller.is_active() {
            let result = self.controller.stop();
            self.settle(result);
        }
        self.exit();
    }
}
