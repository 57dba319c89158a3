//! Plume runner
//!
//! Loads a plugin module, creates one script instance and drives its
//! `OnStart` / `OnUpdate(float)` methods from a fixed-step frame loop.
//!
//! ```text
//! plume <module-path> <TypeName> [--frames N] [--watch] [--config FILE]
//! ```

use plume_host::{InstanceId, MethodId, RuntimeConfig, ScriptContext, ScriptError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const SIG_VOID: i32 = 0;
const SIG_FLOAT: i32 = 1;
const FRAME_DT: f32 = 1.0 / 60.0;
const FRAME_SLEEP: Duration = Duration::from_millis(16);

#[derive(Debug, Default)]
struct Options {
    module: PathBuf,
    type_name: String,
    frames: Option<u64>,
    watch: bool,
    config: Option<PathBuf>,
}

fn usage() -> String {
    "usage: plume <module-path> <TypeName> [--frames N] [--watch] [--config FILE]".to_string()
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args.next().ok_or_else(usage)?;
                options.frames = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid frame count '{}'", value))?,
                );
            }
            "--watch" => options.watch = true,
            "--config" => options.config = Some(PathBuf::from(args.next().ok_or_else(usage)?)),
            "-h" | "--help" => return Err(usage()),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    options.module = positional.next().map(PathBuf::from).ok_or_else(usage)?;
    options.type_name = positional.next().ok_or_else(usage)?;
    Ok(options)
}

/// The driven script instance of the current generation
struct Script {
    instance: InstanceId,
    update: MethodId,
}

fn attach(context: &mut ScriptContext, type_name: &str) -> plume_host::Result<Script> {
    context.register_signature(SIG_VOID, "void", &[])?;
    context.register_signature(SIG_FLOAT, "void", &["float"])?;

    let instance = context.create_instance(type_name)?;
    match context.bind_instance_method(instance, "OnStart", SIG_VOID) {
        Ok(start) => context.invoke_void(start)?,
        Err(ScriptError::MethodNotFound(_)) => log::debug!("'{}' has no OnStart", type_name),
        Err(e) => return Err(e),
    }

    let update = context.bind_instance_method(instance, "OnUpdate", SIG_FLOAT)?;
    log::info!("Attached '{}' as instance {}", type_name, instance);
    Ok(Script { instance, update })
}

fn run(options: Options) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RuntimeConfig::load(options.config.as_deref())?;
    if options.watch {
        config.hot_reload.enabled = true;
    }

    let mut context = ScriptContext::new(config.clone());
    context.load_module(&options.module)?;
    log::info!("Types: {}", context.type_names().join(", "));

    #[cfg(feature = "hot-reload")]
    let watcher = {
        let mut watcher = plume_host::ModuleWatcher::new(&config.hot_reload)?;
        watcher.watch(&options.module)?;
        watcher
    };
    #[cfg(not(feature = "hot-reload"))]
    if config.hot_reload.enabled {
        log::warn!("Built without hot-reload support, --watch ignored");
    }

    let mut script = Some(attach(&mut context, &options.type_name)?);
    let mut frame: u64 = 0;

    while options.frames.map_or(true, |limit| frame < limit) {
        #[cfg(feature = "hot-reload")]
        match watcher.poll(&mut context) {
            Ok(true) => {
                script = match attach(&mut context, &options.type_name) {
                    Ok(script) => Some(script),
                    Err(e) => {
                        log::error!("Failed to reattach after reload: {}", e);
                        None
                    }
                };
            }
            Ok(false) => {}
            Err(e) => {
                log::error!("Reload failed: {}", e);
                script = None;
            }
        }

        if let Some(current) = &script {
            if let Err(e) = context.invoke_float(current.update, FRAME_DT) {
                log::error!("OnUpdate failed on frame {}: {}", frame, e);
            }
        }

        frame += 1;
        std::thread::sleep(FRAME_SLEEP);
    }

    if let Some(current) = script {
        context.destroy_instance(current.instance)?;
    }
    context.unload();
    log::info!("Ran {} frames", frame);
    Ok(())
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match run(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
