//! What each stage does.

use super::cancel::CancelToken;
use super::pipeline::{Run, StageError};
use super::process::{Stream, ToolExit, ToolProcess};
use super::stage::Stage;
use super::toolchain::ToolCommand;
use crate::diagnostic::{Diagnostic, DiagnosticParser, LineReader, ParseSummary, Tool};
use crate::sanitizer::{DependencySanitizer, SanitizeError};
use crate::signer::{ArchiveSigner, SignError, ZipAbort};
use std::cell::RefCell;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::iter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Alignment boundary passed to the zip aligner.
const ALIGNMENT: &str = "4";

impl Run<'_> {
    pub(super) fn clean(&mut self) -> Result<(), StageError> {
        self.request.validate().map_err(StageError::InvalidRequest)?;
        self.layout.invalidate_from(Stage::Clean)?;
        fs::create_dir_all(self.layout.bin_dir())?;
        Ok(())
    }

    pub(super) fn generate_resources(&mut self) -> Result<(), StageError> {
        let stage = Stage::GenerateResources;
        let toolchain = self.toolchain;
        let gen_dir = self.layout.gen_dir();
        fs::create_dir_all(&gen_dir)?;

        if let Some(aidl) = &toolchain.aidl {
            let interfaces = find_files(self.request.source_dirs(), "aidl")?;
            debug!(count = interfaces.len(), "compiling interface definitions");
            for file in interfaces {
                let args = self.aidl_args(&file);
                self.run_tool(stage, Tool::Aidl, aidl, &args)?;
            }
        }

        let args = self.aapt_args();
        self.run_tool(stage, Tool::Aapt, &toolchain.aapt, &args)?;
        expect_artifact(&self.layout.resources_archive())
    }

    pub(super) fn compile(&mut self) -> Result<(), StageError> {
        let toolchain = self.toolchain;
        let classes_dir = self.layout.classes_dir();
        fs::create_dir_all(&classes_dir)?;

        let mut roots = self.request.source_dirs().to_vec();
        roots.push(self.layout.gen_dir());
        let sources = find_files(&roots, "java")?;
        debug!(count = sources.len(), "compiling java sources");

        let level = OsString::from(&toolchain.java_level);
        let mut args: Vec<OsString> = vec![
            "-encoding".into(),
            "UTF-8".into(),
            "-source".into(),
            level.clone(),
            "-target".into(),
            level,
            "-bootclasspath".into(),
            toolchain.platform_jar.clone().into(),
            "-sourcepath".into(),
            join_paths(&roots)?,
            "-d".into(),
            classes_dir.into(),
        ];
        let libraries = self.request.libraries();
        if !libraries.is_empty() {
            args.push("-classpath".into());
            args.push(join_paths(libraries)?);
        }
        let debug_info = if self.request.variant().is_debug() { "-g" } else { "-g:none" };
        args.push(debug_info.into());
        args.extend(sources.into_iter().map(OsString::from));

        self.run_tool(Stage::Compile, Tool::Javac, &toolchain.javac, &args)
    }

    pub(super) fn convert(&mut self) -> Result<(), StageError> {
        let toolchain = self.toolchain;
        let dex_file = self.layout.dex_file();
        let inputs = [self.layout.classes_dir().into_os_string()];
        let args = self.dex_args(&dex_file, &inputs);
        self.run_tool(Stage::Convert, Tool::Dex, &toolchain.dex, &args)?;
        expect_artifact(&dex_file)
    }

    pub(super) fn package(&mut self) -> Result<(), StageError> {
        let stage = Stage::Package;
        let toolchain = self.toolchain;

        let sanitizer = DependencySanitizer::new(self.layout.root())
            .with_supersessions(self.supersessions.to_vec());
        let libraries = match sanitizer.sanitize(self.request.libraries()) {
            Ok(set) => set,
            Err(e) => {
                self.report_sanitize_error(&e);
                return Err(e.into());
            }
        };
        for note in libraries.notes() {
            self.emit(stage, Diagnostic::warning(Tool::Sanitizer, note.clone()));
        }
        self.libraries = libraries.files();
        info!(count = self.libraries.len(), "libraries sanitized");

        let dex = if self.libraries.is_empty() {
            self.layout.dex_file()
        } else {
            let merged = self.layout.merged_dex();
            fs::create_dir_all(self.layout.merged_dex_dir())?;
            let mut inputs = vec![self.layout.dex_file().into_os_string()];
            inputs.extend(self.libraries.iter().map(|p| p.clone().into_os_string()));
            let args = self.dex_args(&merged, &inputs);
            self.run_tool(stage, Tool::Dex, &toolchain.dex, &args)?;
            expect_artifact(&merged)?;
            merged
        };

        let output = self.layout.unsigned_package();
        let mut archive = ArchiveSigner::create(&output, None).map_err(StageError::Archive)?;
        if let Err(e) = self.fill_package(&mut archive, &dex) {
            archive.clean_up();
            return Err(e);
        }
        archive.close().map_err(StageError::Archive)?;

        expect_artifact(&output)?;
        self.package = Some(output);
        Ok(())
    }

    pub(super) fn sign(&mut self) -> Result<(), StageError> {
        let request = self.request;
        let input = self.current_package()?;
        let output = self.layout.signed_package();

        let Some(credentials) = request.signing() else {
            self.emit(
                Stage::Sign,
                Diagnostic::warning(Tool::Signer, "no signing credentials, package left unsigned"),
            );
            fs::copy(&input, &output)?;
            self.package = Some(output);
            return Ok(());
        };

        let key = credentials.load().map_err(StageError::Signing)?;
        let mut archive = ArchiveSigner::create(&output, Some(key))
            .map_err(StageError::Signing)?
            .with_created_by(&credentials.created_by);

        let cancel = self.cancel.clone();
        let copied = File::open(&input).map_err(SignError::from).and_then(|file| {
            let mut filter = cancel_filter(&cancel);
            archive.write_zip(BufReader::new(file), Some(&mut filter), None)
        });
        if let Err(e) = copied {
            archive.clean_up();
            return Err(self.archive_error(Stage::Sign, e));
        }
        archive.close().map_err(StageError::Signing)?;
        info!(entries = archive.manifest().len(), "package signed");

        expect_artifact(&output)?;
        self.package = Some(output);
        Ok(())
    }

    pub(super) fn align(&mut self) -> Result<(), StageError> {
        let toolchain = self.toolchain;
        let Some(zipalign) = &toolchain.zipalign else {
            debug!("no zip aligner configured, nothing to align");
            return Ok(());
        };

        let input = self.current_package()?;
        let output = self.layout.aligned_package();
        let args: Vec<OsString> = vec![
            "-f".into(),
            ALIGNMENT.into(),
            input.into_os_string(),
            output.clone().into_os_string(),
        ];
        self.run_tool(Stage::Align, Tool::Zipalign, zipalign, &args)?;
        expect_artifact(&output)?;
        self.package = Some(output);
        Ok(())
    }

    pub(super) fn publish(&mut self) -> Result<(), StageError> {
        let input = self.current_package()?;
        let output = self.layout.published_package();
        fs::copy(&input, output)?;
        info!(path = %output.display(), "package published");
        Ok(())
    }

    /// Run one tool to completion, streaming its diagnostics as they arrive.
    fn run_tool(
        &mut self,
        stage: Stage,
        tool: Tool,
        command: &ToolCommand,
        args: &[OsString],
    ) -> Result<(), StageError> {
        let process = ToolProcess::spawn(command, args, None, self.cancel.clone())
            .map_err(|source| StageError::ToolSpawn { tool, source })?;
        let process = RefCell::new(process);

        // Each stream gets its own reader so a multi-line report on stderr
        // never swallows a stdout line that arrived in between.
        let parser = DiagnosticParser::new(tool);
        let mut stdout_summary = ParseSummary::default();
        let mut stderr_summary = ParseSummary::default();
        {
            let mut stdout = LineReader::new(iter::from_fn(|| {
                process.borrow_mut().next_line_from(Stream::Stdout)
            }));
            let mut stderr = LineReader::new(iter::from_fn(|| {
                process.borrow_mut().next_line_from(Stream::Stderr)
            }));
            let mut emit = |diagnostic: Diagnostic| self.emit(stage, diagnostic);

            loop {
                let stream = if stdout.has_pushed_back() {
                    Stream::Stdout
                } else if stderr.has_pushed_back() {
                    Stream::Stderr
                } else {
                    match process.borrow_mut().peek_stream() {
                        Some(stream) => stream,
                        None => break,
                    }
                };
                let (reader, summary) = match stream {
                    Stream::Stdout => (&mut stdout, &mut stdout_summary),
                    Stream::Stderr => (&mut stderr, &mut stderr_summary),
                };
                parser.parse_next(reader, summary, &mut emit);
            }
        }

        match process.into_inner().finish()? {
            ToolExit::Success => Ok(()),
            ToolExit::Cancelled => Err(StageError::Cancelled),
            ToolExit::Failed(code) => Err(StageError::ToolExit {
                tool,
                code,
                errors: stdout_summary.errors + stderr_summary.errors,
            }),
        }
    }

    fn aidl_args(&self, file: &Path) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(framework) = &self.toolchain.framework_aidl {
            let mut arg = OsString::from("-p");
            arg.push(framework);
            args.push(arg);
        }
        for dir in self.request.source_dirs() {
            let mut arg = OsString::from("-I");
            arg.push(dir);
            args.push(arg);
        }
        let mut out = OsString::from("-o");
        out.push(self.layout.gen_dir());
        args.push(out);
        args.push(file.into());
        args
    }

    fn aapt_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["package".into(), "-f".into(), "--auto-add-overlay".into()];
        if self.request.variant().is_debug() {
            args.push("--debug-mode".into());
        }
        args.push("-M".into());
        args.push(self.request.manifest().into());
        args.push("-I".into());
        args.push(self.toolchain.platform_jar.clone().into());
        for dir in self.request.resource_dirs() {
            args.push("-S".into());
            args.push(dir.into());
        }
        for dir in self.request.asset_dirs() {
            args.push("-A".into());
            args.push(dir.into());
        }
        args.push("-m".into());
        args.push("-J".into());
        args.push(self.layout.gen_dir().into());
        args.push("-F".into());
        args.push(self.layout.resources_archive().into());
        args
    }

    fn dex_args(&self, output: &Path, inputs: &[OsString]) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--dex".into()];
        if self.request.variant().is_debug() {
            args.push("--debug".into());
        }
        let mut out = OsString::from("--output=");
        out.push(output);
        args.push(out);
        args.extend(inputs.iter().cloned());
        args
    }

    /// Compiled resources, the dex file and library java resources.
    fn fill_package(&mut self, archive: &mut ArchiveSigner, dex: &Path) -> Result<(), StageError> {
        let cancel = self.cancel.clone();
        let resources = File::open(self.layout.resources_archive())?;
        let mut filter = cancel_filter(&cancel);
        let copied = archive.write_zip(BufReader::new(resources), Some(&mut filter), None);
        copied.map_err(|e| self.archive_error(Stage::Package, e))?;

        archive.write_file(dex, "classes.dex").map_err(StageError::Archive)?;

        let mut seen: HashSet<String> =
            archive.manifest().entry_names().into_iter().map(str::to_string).collect();
        let libraries = self.libraries.clone();
        for library in &libraries {
            let file = File::open(library)?;
            let origin = library.display().to_string();
            let mut filter = |name: &str| -> Result<bool, ZipAbort> {
                if cancel.is_cancelled() {
                    return Err(ZipAbort(CANCELLED.to_string()));
                }
                if name.ends_with(".class") {
                    return Ok(false);
                }
                if !seen.insert(name.to_string()) {
                    return Err(ZipAbort(format!("duplicate entry '{}' in {}", name, origin)));
                }
                Ok(true)
            };
            let copied = archive.write_zip(BufReader::new(file), Some(&mut filter), None);
            copied.map_err(|e| self.archive_error(Stage::Package, e))?;
        }
        Ok(())
    }

    /// Map a writer error, turning a cancellation abort into `Cancelled`.
    fn archive_error(&mut self, stage: Stage, error: SignError) -> StageError {
        if self.cancel.is_cancelled() {
            return StageError::Cancelled;
        }
        if let SignError::Aborted(abort) = &error {
            self.emit(stage, Diagnostic::error(Tool::Pipeline, abort.0.clone()));
        }
        match stage {
            Stage::Sign => StageError::Signing(error),
            _ => StageError::Archive(error),
        }
    }

    fn report_sanitize_error(&mut self, error: &SanitizeError) {
        let mut lines = error.details().into_iter();
        if let Some(first) = lines.next() {
            self.emit(Stage::Package, Diagnostic::error(Tool::Sanitizer, first));
        }
        for line in lines {
            self.emit(Stage::Package, Diagnostic::raw(Tool::Sanitizer, line));
        }
    }

    fn current_package(&self) -> Result<PathBuf, StageError> {
        let path = self.package.clone().unwrap_or_else(|| self.layout.unsigned_package());
        expect_artifact(&path)?;
        Ok(path)
    }
}

const CANCELLED: &str = "cancelled";

/// An entry filter that copies everything until the build is cancelled.
fn cancel_filter(cancel: &CancelToken) -> impl FnMut(&str) -> Result<bool, ZipAbort> + '_ {
    move |_name: &str| {
        if cancel.is_cancelled() {
            Err(ZipAbort(CANCELLED.to_string()))
        } else {
            Ok(true)
        }
    }
}

fn expect_artifact(path: &Path) -> Result<(), StageError> {
    if path.exists() {
        Ok(())
    } else {
        warn!(path = %path.display(), "expected artifact is missing");
        Err(StageError::MissingArtifact(path.to_path_buf()))
    }
}

/// Every file with `extension` below `dirs`, sorted.
fn find_files(dirs: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>, StageError> {
    let mut files = Vec::new();
    for dir in dirs {
        let pattern = format!("{}/**/*.{}", glob::Pattern::escape(&dir.to_string_lossy()), extension);
        let paths = glob::glob(&pattern)
            .map_err(|e| StageError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        for entry in paths {
            let path = entry.map_err(|e| StageError::Io(e.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn join_paths(paths: &[PathBuf]) -> Result<OsString, StageError> {
    std::env::join_paths(paths)
        .map_err(|e| StageError::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))
}
