// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use nvstrap::{
    command::{CommandSpec, Output, Runner},
    component::{Session, SkipGroup},
    config::Settings,
    fetch::{Artifact, Fetch, FetchError, FetchRequest},
    orchestrator::{Orchestrator, RunReport},
    path::Paths,
    platform::{Arch, OsFamily, Platform},
    state::StateStore,
};

use anyhow::Result;
use flate2::{write::GzEncoder, Compression};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tempfile::TempDir;

/// Pretend host with an apt package manager.
///
/// Installing a package makes its binaries show up on the fake search path.
/// Packages listed as unavailable fail like apt does for unknown packages.
pub(crate) struct FakeSystem {
    programs: Mutex<BTreeSet<String>>,
    unavailable: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
    target: PathBuf,
    plugins: PathBuf,
}

impl FakeSystem {
    pub(crate) fn new(target: impl Into<PathBuf>, plugins: impl Into<PathBuf>) -> Self {
        Self {
            programs: Mutex::new(BTreeSet::new()),
            unavailable: Mutex::new(BTreeSet::from(["lazygit".to_string()])),
            calls: Mutex::new(Vec::new()),
            target: target.into(),
            plugins: plugins.into(),
        }
    }

    pub(crate) fn make_unavailable(&self, package: &str) {
        self.unavailable.lock().unwrap().insert(package.into());
    }

    pub(crate) fn uninstall(&self, program: &str) {
        self.programs.lock().unwrap().remove(program);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Headless plugin sync: check out every pinned plugin, or write an
    /// empty lockfile if the configuration has none.
    fn sync_plugins(&self) -> std::io::Result<()> {
        let lockfile = self.target.join("lazy-lock.json");
        let Ok(content) = fs::read_to_string(&lockfile) else {
            return fs::write(lockfile, "{}\n");
        };

        let pinned: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&content).map_err(std::io::Error::other)?;
        for name in pinned.keys() {
            fs::create_dir_all(self.plugins.join(name))?;
        }

        Ok(())
    }

    fn binaries(package: &str) -> &'static [&'static str] {
        match package {
            "neovim" => &["nvim"],
            "git" => &["git"],
            "jq" => &["jq"],
            "ripgrep" => &["rg"],
            "fd-find" => &["fdfind"],
            "fzf" => &["fzf"],
            "curl" => &["curl"],
            "unzip" => &["unzip"],
            "nodejs" => &["node"],
            "npm" => &["npm"],
            "python3" => &["python3"],
            "python3-pip" => &["pip3"],
            "tmux" => &["tmux"],
            _ => &[],
        }
    }
}

impl Runner for FakeSystem {
    fn run(&self, cmd: &CommandSpec) -> nvstrap::command::Result<Output> {
        self.calls.lock().unwrap().push(cmd.to_string());
        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        match (cmd.program.as_str(), args.as_slice()) {
            ("apt-get", ["install", "-y", package]) => {
                if self.unavailable.lock().unwrap().contains(*package) {
                    return Ok(Output::failed(format!(
                        "E: Unable to locate package {package}\n"
                    )));
                }

                let mut programs = self.programs.lock().unwrap();
                for binary in Self::binaries(package) {
                    programs.insert(binary.to_string());
                }
                Ok(Output::ok(""))
            }
            ("git", ["clone", .., dest]) => {
                fs::create_dir_all(Path::new(dest).join("lua")).map_err(|err| {
                    nvstrap::command::CommandError::Spawn {
                        source: err,
                        program: "git".into(),
                    }
                })?;
                Ok(Output::ok(""))
            }
            _ => Ok(Output::ok("")),
        }
    }

    fn run_interactive(&self, cmd: &CommandSpec) -> nvstrap::command::Result<()> {
        self.calls.lock().unwrap().push(cmd.to_string());
        if cmd.program == "nvim" {
            self.sync_plugins().map_err(|err| nvstrap::command::CommandError::Spawn {
                source: err,
                program: "nvim".into(),
            })?;
        }

        Ok(())
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        self.programs
            .lock()
            .unwrap()
            .contains(name)
            .then(|| PathBuf::from("/usr/bin").join(name))
    }
}

/// Pretend network serving release assets built on the fly.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    downloads: Mutex<Vec<String>>,
    count: AtomicUsize,
}

impl FakeFetcher {
    pub(crate) fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn build(request: &FetchRequest, dest: &Path) -> std::io::Result<()> {
        let name = request.file_name.as_str();
        if name.ends_with(".zip") {
            let mut zip = zip::ZipWriter::new(fs::File::create(dest)?);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("JetBrainsMonoNerdFont-Regular.ttf", options)?;
            zip.write_all(b"not really a font")?;
            zip.finish()?;
        } else if name.ends_with(".tar.gz") {
            let encoder = GzEncoder::new(fs::File::create(dest)?, Compression::default());
            let mut tar = tar::Builder::new(encoder);
            let body = b"\x7fELF lazygit";
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            tar.append_data(&mut header, "lazygit", &body[..])?;
            tar.into_inner()?.finish()?;
        } else {
            fs::write(dest, b"\x7fELF yq")?;
        }

        Ok(())
    }
}

impl Fetch for FakeFetcher {
    fn fetch_and_verify(&self, request: &FetchRequest) -> nvstrap::fetch::Result<Artifact> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.downloads.lock().unwrap().push(request.url.clone());

        let dir = tempfile::tempdir().map_err(FetchError::Runtime)?;
        let path = dir.path().join(&request.file_name);
        Self::build(request, &path).map_err(FetchError::Runtime)?;

        Ok(Artifact::new(dir, path))
    }

    fn fetch_text(&self, url: &str) -> nvstrap::fetch::Result<String> {
        if url.ends_with("/releases/latest") {
            return Ok(r#"{"tag_name": "v0.44.1", "name": "v0.44.1"}"#.into());
        }

        Err(FetchError::Status {
            url: url.into(),
            status: 404,
        })
    }
}

/// Sandboxed home directory with an editor configuration to deploy.
pub(crate) struct Sandbox {
    home: TempDir,
    pub(crate) paths: Paths,
    pub(crate) system: Arc<FakeSystem>,
    pub(crate) fetcher: Arc<FakeFetcher>,
}

impl Sandbox {
    pub(crate) fn new() -> Result<Self> {
        let home = tempfile::tempdir()?;
        let source = home.path().join("dotfiles").join("nvim");
        fs::create_dir_all(source.join("lua"))?;
        fs::write(source.join("init.lua"), "require('config')\n")?;
        fs::write(source.join("lua").join("config.lua"), "vim.o.number = true\n")?;

        let mut paths = Paths::with_home(home.path(), source, OsFamily::Linux);
        paths.system_bin = home.path().join("system-bin");
        let system = Arc::new(FakeSystem::new(&paths.target, paths.nvim_data.join("lazy")));

        Ok(Self {
            home,
            paths,
            system,
            fetcher: Arc::new(FakeFetcher::default()),
        })
    }

    pub(crate) fn source_file(&self, name: &str, content: &str) -> Result<()> {
        let path = self.paths.source.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub(crate) fn home(&self) -> &Path {
        self.home.path()
    }

    pub(crate) fn store(&self) -> StateStore {
        StateStore::new(&self.paths.state_file)
    }

    pub(crate) fn orchestrator(&self, skips: &[SkipGroup]) -> Orchestrator {
        let session = Session::new(
            Platform::new(OsFamily::Linux, Arch::X86_64),
            self.paths.clone(),
            Settings::default(),
            self.system.clone(),
            self.fetcher.clone(),
        )
        .with_skips(skips.iter().copied());
        let packages = session.packages.clone().with_retry(0, Duration::ZERO);
        let session = session.with_packages(packages);

        Orchestrator::new(session, self.store())
    }

    pub(crate) fn run(&self, skips: &[SkipGroup]) -> Result<RunReport> {
        Ok(self.orchestrator(skips).run()?)
    }

    pub(crate) fn statuses(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .store()
            .summary()?
            .into_iter()
            .map(|(component, status)| (component.key().to_string(), status.to_string()))
            .collect())
    }
}
