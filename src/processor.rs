use crate::error::ProcessorError;
use crate::workplan::Mode;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Everything the processor needs to know about one workplan.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub mode: Mode,
    pub tile: String,
}

/// The external atmospheric-correction processor.
pub trait Processor {
    fn name(&self) -> String;

    /// Run to completion and return the exit code.
    fn run(&self, invocation: &Invocation) -> Result<i32, ProcessorError>;

    /// Run and treat any non-zero exit code as a failure.
    fn invoke(&self, invocation: &Invocation) -> Result<(), ProcessorError> {
        match self.run(invocation)? {
            0 => Ok(()),
            code => Err(ProcessorError::Failed {
                program: self.name(),
                code,
            }),
        }
    }
}

/// The MAJA executable, run as a child process.
#[derive(Debug, Clone)]
pub struct Maja {
    exe: PathBuf,
    userconf: Option<PathBuf>,
    verbose: bool,
}

impl Maja {
    pub fn new(exe: PathBuf, userconf: Option<PathBuf>, verbose: bool) -> Self {
        Self {
            exe,
            userconf,
            verbose,
        }
    }

    pub fn arguments(&self, invocation: &Invocation) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            path_arg(&invocation.input_dir),
            "-o".to_string(),
            path_arg(&invocation.output_dir),
            "-m".to_string(),
            invocation.mode.as_arg().to_string(),
        ];
        if let Some(userconf) = &self.userconf {
            args.push("-ucs".to_string());
            args.push(path_arg(userconf));
        }
        args.push("--TileId".to_string());
        args.push(invocation.tile.clone());
        if self.verbose {
            args.push("-l".to_string());
            args.push("DEBUG".to_string());
        }
        args
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn forward_lines<R: Read>(reader: R) -> std::io::Result<()> {
    for line in BufReader::new(reader).lines() {
        debug!("{}", line?);
    }
    Ok(())
}

impl Processor for Maja {
    fn name(&self) -> String {
        self.exe
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_arg(&self.exe))
    }

    fn run(&self, invocation: &Invocation) -> Result<i32, ProcessorError> {
        let args = self.arguments(invocation);
        info!("{} {}", self.exe.display(), args.join(" "));
        let start = Instant::now();

        let mut child = Command::new(&self.exe)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessorError::Spawn {
                exe: self.exe.clone(),
                source,
            })?;

        let output_error = |source| ProcessorError::Output {
            program: self.name(),
            source,
        };
        let stderr = child.stderr.take().map(|err| thread::spawn(move || forward_lines(err)));
        if let Some(out) = child.stdout.take() {
            forward_lines(out).map_err(output_error)?;
        }
        if let Some(handle) = stderr {
            if let Ok(result) = handle.join() {
                result.map_err(output_error)?;
            }
        }
        let status = child.wait().map_err(output_error)?;

        info!("{} took {:.1}s", self.name(), start.elapsed().as_secs_f64());
        status
            .code()
            .ok_or_else(|| ProcessorError::Terminated(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(mode: Mode) -> Invocation {
        Invocation {
            input_dir: PathBuf::from("/work/Start_maja_abc"),
            output_dir: PathBuf::from("/data/L2/31TCH"),
            mode,
            tile: "31TCH".to_string(),
        }
    }

    #[test]
    fn test_arguments() {
        let maja = Maja::new(PathBuf::from("/opt/maja/bin/maja"), None, false);
        assert_eq!(
            maja.arguments(&invocation(Mode::Backward)).join(" "),
            "-i /work/Start_maja_abc -o /data/L2/31TCH -m L2BACKWARD --TileId 31TCH"
        );

        let maja = Maja::new(
            PathBuf::from("/opt/maja/bin/maja"),
            Some(PathBuf::from("/opt/maja/userconf")),
            true,
        );
        assert_eq!(
            maja.arguments(&invocation(Mode::Nominal)).join(" "),
            "-i /work/Start_maja_abc -o /data/L2/31TCH -m L2NOMINAL -ucs /opt/maja/userconf --TileId 31TCH -l DEBUG"
        );
        assert_eq!(maja.name(), "maja");
    }

    #[test]
    fn test_exit_codes() {
        let ok = Maja::new(PathBuf::from("/bin/echo"), None, true);
        assert_eq!(ok.run(&invocation(Mode::Init)).unwrap(), 0);
        assert!(ok.invoke(&invocation(Mode::Init)).is_ok());

        let failing = Maja::new(PathBuf::from("/bin/false"), None, false);
        let err = failing.invoke(&invocation(Mode::Init)).unwrap_err();
        assert!(matches!(err, ProcessorError::Failed { code: 1, .. }));
    }

    #[test]
    fn test_missing_executable() {
        let missing = Maja::new(PathBuf::from("/nonexistent/maja"), None, false);
        let err = missing.run(&invocation(Mode::Init)).unwrap_err();
        assert!(matches!(err, ProcessorError::Spawn { .. }));
    }
}
