// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::Sandbox;

use nvstrap::{
    cli::provision,
    component::{fonts, Outcome, SkipGroup},
    state::{Component, Status},
};

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;

fn is_install_action(call: &str) -> bool {
    call.contains(" install ") || call.contains(" clone ") || call.starts_with("nvim")
}

#[test]
fn fresh_run_installs_everything() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let report = sandbox.run(&[])?;

    assert!(!report.is_aborted());
    assert_eq!(report.outcomes.len(), Component::ALL.len());
    assert_eq!(report.failures().count(), 0);
    assert_eq!(report.outcome(Component::Backup), Some(Outcome::AlreadySatisfied));
    assert_eq!(report.outcome(Component::Lazygit), Some(Outcome::Succeeded));

    for (key, status) in sandbox.statuses()? {
        assert_eq!(status, "installed", "{key}");
    }

    let calls = sandbox.system.calls();
    let refreshes = calls.iter().filter(|call| call.ends_with("apt-get update")).count();
    assert_eq!(refreshes, 1);

    let target = &sandbox.paths.target;
    assert!(target.join("init.lua").is_file());
    assert!(target.join("lua").join("config.lua").is_file());
    assert!(sandbox.paths.system_bin.join("yq").is_file());
    assert!(sandbox.paths.system_bin.join("lazygit").is_file());

    assert_eq!(
        sandbox.fetcher.downloads(),
        vec![
            "https://github.com/mikefarah/yq/releases/latest/download/yq_linux_amd64".to_string(),
            "https://github.com/ryanoasis/nerd-fonts/releases/download/v3.2.1/JetBrainsMono.zip"
                .to_string(),
            concat!(
                "https://github.com/jesseduffield/lazygit/releases/download/",
                "v0.44.1/lazygit_0.44.1_Linux_x86_64.tar.gz"
            )
            .to_string(),
        ]
    );

    Ok(())
}

#[test]
fn second_run_changes_nothing() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.run(&[])?;
    let downloads = sandbox.fetcher.count();
    sandbox.system.clear_calls();

    let report = sandbox.run(&[])?;
    for (component, outcome) in &report.outcomes {
        assert_eq!(*outcome, Outcome::AlreadySatisfied, "{component}");
    }

    let actions: Vec<_> = sandbox
        .system
        .calls()
        .into_iter()
        .filter(|call| is_install_action(call))
        .collect();
    assert_eq!(actions, Vec::<String>::new());
    assert_eq!(sandbox.fetcher.count(), downloads);

    Ok(())
}

#[test]
fn skipped_fonts_remove_partial_install_and_keep_state() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let store = sandbox.store();
    store.init()?;
    store.set(Component::Fonts, Status::NotInstalled)?;

    let partial = sandbox.paths.font_dir.join("JetBrainsMono");
    fs::create_dir_all(&partial)?;
    fs::write(partial.join("JetBrainsMonoNerdFont-Bold.ttf"), "half")?;
    fs::write(partial.join(fonts::PARTIAL_MARKER), "")?;

    let report = sandbox.run(&[SkipGroup::Fonts, SkipGroup::Plugins])?;
    assert_eq!(report.outcome(Component::Fonts), Some(Outcome::Skipped));
    assert_eq!(report.outcome(Component::Lazy), Some(Outcome::Skipped));
    assert_eq!(report.outcome(Component::Plugins), Some(Outcome::Skipped));
    assert!(!partial.exists());

    assert_eq!(store.get(Component::Fonts)?, Status::NotInstalled);
    assert_eq!(store.get(Component::Plugins)?, Status::NotCheckedYet);
    assert!(sandbox
        .fetcher
        .downloads()
        .iter()
        .all(|url| !url.contains("nerd-fonts")));
    assert!(sandbox
        .system
        .calls()
        .iter()
        .all(|call| !call.contains(" clone ")));

    Ok(())
}

#[test]
fn reset_state_reprobes_without_reinstalling() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.run(&[])?;

    let store = sandbox.store();
    store.reset_all()?;
    for (key, status) in sandbox.statuses()? {
        assert_eq!(status, "notcheckedyet", "{key}");
    }

    sandbox.system.clear_calls();
    let downloads = sandbox.fetcher.count();
    let report = sandbox.run(&[])?;

    assert_eq!(report.failures().count(), 0);
    assert_eq!(report.outcome(Component::Neovim), Some(Outcome::AlreadySatisfied));
    assert_eq!(report.outcome(Component::Config), Some(Outcome::Succeeded));
    assert!(sandbox.system.calls().iter().all(|call| !is_install_action(call)));
    assert_eq!(sandbox.fetcher.count(), downloads);
    for (key, status) in sandbox.statuses()? {
        assert_eq!(status, "installed", "{key}");
    }

    Ok(())
}

#[test]
fn drift_is_repaired() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.run(&[])?;

    let init = sandbox.paths.target.join("init.lua");
    fs::write(&init, "-- local edit\n")?;
    sandbox.system.uninstall("nvim");

    let report = sandbox.run(&[])?;
    assert_eq!(report.outcome(Component::Neovim), Some(Outcome::Succeeded));
    assert_eq!(report.outcome(Component::Config), Some(Outcome::AlreadySatisfied));
    assert_eq!(fs::read_to_string(&init)?, "require('config')\n");
    assert_eq!(sandbox.store().get(Component::Neovim)?, Status::Installed);

    Ok(())
}

#[test]
fn source_changes_reach_target_on_every_run() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.run(&[])?;

    let init = sandbox.paths.target.join("init.lua");
    assert_eq!(fs::read_to_string(&init)?, "require('config')\n");

    sandbox.source_file("init.lua", "require('config')\nrequire('keymaps')\n")?;
    sandbox.source_file("lua/keymaps.lua", "vim.g.mapleader = ' '\n")?;

    let report = sandbox.run(&[])?;
    assert_eq!(report.outcome(Component::Config), Some(Outcome::AlreadySatisfied));
    assert_eq!(fs::read_to_string(&init)?, "require('config')\nrequire('keymaps')\n");
    assert!(sandbox.paths.target.join("lua").join("keymaps.lua").is_file());

    Ok(())
}

#[test]
fn committed_lockfile_still_syncs_plugins() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source_file(
        "lazy-lock.json",
        r#"{ "telescope.nvim": { "branch": "master", "commit": "abcd" } }"#,
    )?;

    let report = sandbox.run(&[])?;
    assert_eq!(report.outcome(Component::Plugins), Some(Outcome::Succeeded));
    assert!(sandbox.system.calls().iter().any(|call| call.starts_with("nvim")));

    let checkout = sandbox.paths.nvim_data.join("lazy").join("telescope.nvim");
    assert!(checkout.is_dir());

    sandbox.system.clear_calls();
    let report = sandbox.run(&[])?;
    assert_eq!(report.outcome(Component::Plugins), Some(Outcome::AlreadySatisfied));
    assert!(sandbox.system.calls().iter().all(|call| !call.starts_with("nvim")));

    Ok(())
}

#[test]
fn critical_failure_aborts_run() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.system.make_unavailable("git");

    let report = sandbox.run(&[])?;
    assert_eq!(report.aborted_by, Some(Component::Git));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        report.outcomes,
        vec![
            (Component::Neovim, Outcome::Succeeded),
            (Component::Git, Outcome::Failed),
        ]
    );

    let store = sandbox.store();
    assert_eq!(store.get(Component::Neovim)?, Status::Installed);
    assert_eq!(store.get(Component::Git)?, Status::NotInstalled);
    assert_eq!(store.get(Component::Yq)?, Status::NotCheckedYet);
    assert!(!sandbox.paths.target.exists());

    Ok(())
}

#[test]
fn critical_failure_exits_non_zero() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.system.make_unavailable("neovim");

    let mut out = Vec::new();
    let code = provision(&mut sandbox.orchestrator(&[]), &mut out)?;
    let out = String::from_utf8(out)?;

    assert_eq!(code, 1);
    let row = |key: &str, status: &str| {
        out.lines().any(|line| line.split_whitespace().eq([key, status]))
    };
    assert!(row("neovim_install", "notinstalled"));
    assert!(row("git_install", "notcheckedyet"));
    assert!(out.contains("fix the neovim_install failure"));
    assert!(sandbox.system.calls().iter().all(|call| !call.contains("install -y git")));

    Ok(())
}

#[test]
fn non_critical_failure_does_not_abort() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.system.make_unavailable("jq");

    let report = sandbox.run(&[])?;
    assert!(!report.is_aborted());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.failures().collect::<Vec<_>>(), vec![Component::Jq]);
    assert_eq!(report.outcome(Component::Tmux), Some(Outcome::Succeeded));

    Ok(())
}

#[test]
fn unwritable_system_bin_falls_back_to_user_bin() -> Result<()> {
    let mut sandbox = Sandbox::new()?;
    let blocked = sandbox.home().join("blocked");
    fs::write(&blocked, "not a directory")?;
    sandbox.paths.system_bin = blocked;

    let report = sandbox.run(&[])?;
    assert_eq!(report.outcome(Component::Yq), Some(Outcome::Succeeded));
    assert_eq!(report.outcome(Component::Lazygit), Some(Outcome::Succeeded));

    let user_bin = &sandbox.paths.user_bin;
    assert!(user_bin.join("yq").is_file());
    assert!(user_bin.join("lazygit").is_file());

    let profile = fs::read_to_string(&sandbox.paths.shell_profile)?;
    let export = format!("export PATH=\"{}:$PATH\"", user_bin.display());
    assert_eq!(profile.matches(&export).count(), 1);

    Ok(())
}
