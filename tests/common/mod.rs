//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{mpsc, OnceLock};

use cacheplex::{api::create_router, store::TEST_REMOTE_URL_ENV, AppState, StoreHost};

/// Base URL of a store server running on a background thread, started once
/// per test binary.
pub fn store_server_url() -> &'static str {
    static URL: OnceLock<String> = OnceLock::new();
    URL.get_or_init(|| {
        let (tx, rx) = mpsc::channel::<SocketAddr>();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();
                let app = create_router(AppState::new(StoreHost::new(0, None)));
                axum::serve(listener, app).await.unwrap();
            });
        });
        let url = format!("http://{}", rx.recv().unwrap());
        std::env::set_var(TEST_REMOTE_URL_ENV, &url);
        url
    })
}
