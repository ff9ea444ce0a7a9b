use std::io::{self, Read, Write};
use std::sync::Arc;

use codeloom::exchange::{Engine, EngineConfig};
use codeloom::gateways;
use codeloom::memory::{system_instructions_from_env, TaskInput};
use codeloom::tools::builtin_registry;
use session_store::{session_root, SessionStore};

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(instruction) = args.next() else {
        eprintln!("usage: codeloom \"<instruction>\" [code-file]");
        eprintln!("       echo '<code>' | codeloom \"<instruction>\" -");
        return Ok(());
    };

    let code = match args.next() {
        Some(path) if path == "-" => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };

    let cwd = std::env::current_dir()?;
    let store = Arc::new(SessionStore::open(session_root(&cwd)).map_err(io::Error::other)?);

    let session_id = match store.current_session().map_err(io::Error::other)? {
        Some(session_id) => session_id,
        None => {
            let meta = store.create(None).map_err(io::Error::other)?;
            store
                .set_current(&meta.session_id)
                .map_err(io::Error::other)?;
            meta.session_id
        }
    };

    let registry = Arc::new(builtin_registry(&cwd).map_err(io::Error::other)?);
    let gateway = gateways::gateway_from_env().map_err(io::Error::other)?;

    let config = EngineConfig {
        system_instructions: system_instructions_from_env(),
        ..EngineConfig::default()
    };
    let engine = Engine::new(gateway, registry, store, config);

    let mut handle = engine
        .run_exchange(&session_id, TaskInput::new(instruction, code))
        .map_err(io::Error::other)?;

    if let Some(chunks) = handle.take_chunks() {
        let mut stdout = io::stdout();
        for chunk in chunks {
            stdout.write_all(chunk.render_plain().as_bytes())?;
            stdout.flush()?;
        }
        stdout.write_all(b"\n")?;
    }

    handle.wait().map_err(io::Error::other)?;
    Ok(())
}
