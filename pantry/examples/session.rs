//! Wires a small session stack and prints what the container does.
//!
//! Run with `RUST_LOG=pantry_container=debug` to see resolution logs.

use std::sync::Arc;

use pantry::prelude::*;
use tracing_subscriber::EnvFilter;

struct SessionStorage {
    cookie_name: String,
}

struct Session {
    storage: Arc<SessionStorage>,
}

struct SessionProvider;

impl Provider for SessionProvider {
    fn register(&self, container: &Container) -> Result<()> {
        container.set_factory("session_storage", |c| {
            Ok(SessionStorage {
                cookie_name: c.get_as::<String>("cookie_name")?.to_string(),
            })
        })?;
        container.set_factory("session", |c| {
            Ok(Session {
                storage: c.get_as::<SessionStorage>("session_storage")?,
            })
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let container = Container::builder()
        .value("cookie_name", String::from("SESSION_ID"))
        .provider(SessionProvider)
        .protected("request_id", {
            let next = Arc::new(std::sync::atomic::AtomicU64::new(1));
            move |_| Ok(next.fetch_add(1, std::sync::atomic::Ordering::SeqCst))
        })
        .build()?;

    container.extend_as::<SessionStorage, _, _>("session_storage", |storage, _| {
        Ok(SessionStorage {
            cookie_name: format!("{}_SECURE", storage.cookie_name),
        })
    })?;

    container.warm_up()?;

    let session = container.get_as::<Session>("session")?;
    println!("cookie: {}", session.storage.cookie_name);

    for _ in 0..3 {
        println!("request: {}", container.get_as::<u64>("request_id")?);
    }

    if let Err(err) = container.set_value("session", ()) {
        println!("rejected: {err}");
    }

    if let Err(err) = container.get("sesion") {
        println!("lookup: {err}");
    }

    Ok(())
}
