use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use moltbook_api::NewAgent;
use moltbook_mock_server::{router, MockServer};
use tokio::sync::Mutex;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Address to listen on
    #[structopt(short, long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Agents to register on startup, their api keys get logged
    #[structopt(short, long)]
    agent: Vec<String>,

    /// Communities to create on startup
    #[structopt(short, long, default_value = "general")]
    submolt: Vec<String>,

    /// Answer comments already nested
    #[structopt(long)]
    nested: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let mut server = MockServer::new(chrono::Utc::now());
    server.test_set_nested(opt.nested);
    for s in &opt.submolt {
        server.admin_create_submolt(s, s, "");
    }
    for a in &opt.agent {
        let key = server
            .register(NewAgent {
                name: a.clone(),
                description: None,
            })
            .with_context(|| format!("registering agent {a:?}"))?
            .agent
            .api_key;
        tracing::info!(agent = %a, %key, "registered agent");
    }

    let app = router(Arc::new(Mutex::new(server)));
    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
