// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provisioning run orchestration.
//!
//! Components are driven one after another in a fixed order, because later
//! components depend on earlier ones, e.g., plugin sync needs the editor and
//! the deployed configuration. A failed critical component aborts the run.
//! Every other failure is recorded and the run moves on.

use crate::{
    component::{default_installers, drive, Installer, Outcome, Session},
    state::{Component, StateError, StateStore, Status},
};

use std::fmt::Write;
use tracing::{error, info, instrument};

/// Outcome of a whole provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Outcome per component, in run order.
    pub outcomes: Vec<(Component, Outcome)>,

    /// Critical component that aborted the run.
    pub aborted_by: Option<Component>,
}

impl RunReport {
    /// Outcome of component, if it was reached.
    pub fn outcome(&self, component: Component) -> Option<Outcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == component)
            .map(|(_, outcome)| *outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = Component> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == Outcome::Failed)
            .map(|(name, _)| *name)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted_by.is_some()
    }

    /// Process exit code for this run.
    ///
    /// Only an aborted run is unsuccessful. Non-critical failures are
    /// reported but do not fail the run.
    pub fn exit_code(&self) -> i32 {
        if self.is_aborted() {
            1
        } else {
            0
        }
    }
}

/// Drives every component installer in order.
pub struct Orchestrator {
    session: Session,
    store: StateStore,
    installers: Vec<Box<dyn Installer>>,
}

impl Orchestrator {
    /// Construct new orchestrator with full installer lineup.
    pub fn new(session: Session, store: StateStore) -> Self {
        Self::with_installers(session, store, default_installers())
    }

    /// Construct new orchestrator with custom installer lineup.
    pub fn with_installers(
        session: Session,
        store: StateStore,
        installers: Vec<Box<dyn Installer>>,
    ) -> Self {
        Self {
            session,
            store,
            installers,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Execute provisioning run.
    ///
    /// # Errors
    ///
    /// - Return [`StateError`] if state store cannot be initialized, read,
    ///   or written. Component failures are reported in [`RunReport`].
    #[instrument(skip(self), level = "debug")]
    pub fn run(&mut self) -> Result<RunReport, StateError> {
        self.store.init()?;
        info!(
            "provisioning on {} using {}",
            self.session.platform,
            self.store.path().display()
        );

        let mut report = RunReport {
            outcomes: Vec::with_capacity(self.installers.len()),
            aborted_by: None,
        };

        for installer in &self.installers {
            let component = installer.component();
            let outcome = drive(installer.as_ref(), &mut self.session, &self.store)?;
            report.outcomes.push((component, outcome));

            if outcome == Outcome::Failed && component.is_critical() {
                error!("{component} is required, aborting");
                report.aborted_by = Some(component);
                break;
            }
        }

        Ok(report)
    }
}

/// Render persisted state as an aligned table.
pub fn render_summary(summary: &[(Component, Status)]) -> String {
    let width = summary
        .iter()
        .map(|(component, _)| component.key().len())
        .max()
        .unwrap_or(0);

    let mut table = String::new();
    for (component, status) in summary {
        let _ = writeln!(table, "  {:<width$}  {status}", component.key());
    }

    table
}

/// Steps left to the operator after a run.
pub fn next_steps(report: &RunReport) -> String {
    let mut steps = String::new();
    if let Some(component) = report.aborted_by {
        let _ = writeln!(
            steps,
            "  fix the {component} failure above and run nvstrap again"
        );
        return steps;
    }

    let failed: Vec<_> = report.failures().map(|c| c.key()).collect();
    if !failed.is_empty() {
        let _ = writeln!(
            steps,
            "  re-run nvstrap to retry failed components: {}",
            failed.join(", ")
        );
    }

    let _ = writeln!(steps, "  restart your shell so PATH changes take effect");
    let _ = writeln!(steps, "  start the editor with `nvim` and run `:checkhealth`");
    if report.outcome(Component::Fonts) != Some(Outcome::Skipped) {
        let _ = writeln!(steps, "  select the Nerd Font in your terminal emulator");
    }

    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_is_aligned() {
        let summary = [
            (Component::Neovim, Status::Installed),
            (Component::Jq, Status::NotInstalled),
            (Component::Tmux, Status::NotCheckedYet),
        ];

        let expect = concat!(
            "  neovim_install  installed\n",
            "  jq_install      notinstalled\n",
            "  tmux_install    notcheckedyet\n",
        );
        assert_eq!(render_summary(&summary), expect);
    }

    #[test]
    fn only_abort_fails_the_run() {
        let mut report = RunReport {
            outcomes: vec![
                (Component::Neovim, Outcome::Succeeded),
                (Component::Jq, Outcome::Failed),
            ],
            aborted_by: None,
        };
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.failures().collect::<Vec<_>>(), vec![Component::Jq]);
        assert!(next_steps(&report).contains("jq_install"));

        report.aborted_by = Some(Component::Git);
        assert_eq!(report.exit_code(), 1);
        assert!(next_steps(&report).contains("git_install"));
    }
}
