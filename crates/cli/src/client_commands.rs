use {
    anyhow::Result,
    clap::Subcommand,
    secrecy::{ExposeSecret, Secret},
    wabridge_config::{ApiConfig, ConfigStore, GatewayConfig, SqliteConfigStore},
    wabridge_gateway::{auth::generate_token, seed_default_client},
    wabridge_sessions::is_valid_client_id,
};

#[derive(Subcommand)]
pub enum ClientAction {
    /// List clients with their tokens and webhook settings.
    List,
    /// Register a client (or replace its token).
    Add {
        #[arg(value_parser = parse_client_id)]
        client: String,
        /// Token to assign; a random one is generated when omitted.
        #[arg(long)]
        token: Option<String>,
    },
    /// Remove a client record.
    Delete { client: String },
}

fn parse_client_id(raw: &str) -> std::result::Result<String, String> {
    if is_valid_client_id(raw) {
        Ok(raw.to_string())
    } else {
        Err("use 1-64 letters, digits, '-' or '_'".into())
    }
}

async fn open_store(config: &GatewayConfig) -> Result<SqliteConfigStore> {
    Ok(SqliteConfigStore::connect(&config.storage.database_url).await?)
}

pub async fn init_db(config: &GatewayConfig) -> Result<()> {
    let store = open_store(config).await?;
    match seed_default_client(&store, &config.auth).await? {
        Some(token) => {
            println!("Created client '{}'.", config.auth.default_client);
            println!("Token: {token}");
        },
        None => println!(
            "Client '{}' already exists; database left unchanged.",
            config.auth.default_client
        ),
    }
    Ok(())
}

pub async fn handle_clients(action: ClientAction, config: &GatewayConfig) -> Result<()> {
    let store = open_store(config).await?;
    match action {
        ClientAction::List => list(&store).await,
        ClientAction::Add { client, token } => add(&store, client, token).await,
        ClientAction::Delete { client } => delete(&store, &client).await,
    }
}

async fn list(store: &SqliteConfigStore) -> Result<()> {
    let clients = store.list().await?;
    if clients.is_empty() {
        println!("No clients. Run `wabridge init-db` first.");
        return Ok(());
    }
    for c in clients {
        let webhook = c.webhook_target().unwrap_or("disabled");
        println!("{:<16} {:<34} webhook: {webhook}", c.client, c.token.expose_secret());
    }
    Ok(())
}

async fn add(store: &SqliteConfigStore, client: String, token: Option<String>) -> Result<()> {
    let token = token.unwrap_or_else(generate_token);
    let mut record = store
        .get(&client)
        .await?
        .unwrap_or_else(|| ApiConfig::new(client.clone(), ""));
    record.token = Secret::new(token.clone());
    store.upsert(record).await?;
    println!("Client '{client}' saved.");
    println!("Token: {token}");
    Ok(())
}

async fn delete(store: &SqliteConfigStore, client: &str) -> Result<()> {
    if store.delete(client).await? {
        println!("Client '{client}' deleted.");
    } else {
        anyhow::bail!("no such client: {client}");
    }
    Ok(())
}
