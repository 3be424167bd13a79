//! Basic authentication flow against a Komari server.
//!
//! This program builds a `KomariClient`, checks its initial authentication
//! state, logs in and then asks the backend who it thinks we are.

use komari_client::{KomariClient, KomariResult};

#[tokio::main]
async fn main() -> KomariResult<()> {
    dotenvy::dotenv().ok();
    let base_url =
        std::env::var("KOMARI_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:25774".to_string());
    let username = std::env::var("KOMARI_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("KOMARI_PASSWORD").unwrap_or_default();

    let client = KomariClient::builder()
        .base_url(base_url)
        .credentials(username, password)
        // .two_factor_code("123456")
        .build()?;

    println!("\n🔑 Authentication Status");
    println!("------------------------");
    println!(
        "Initial state: {}",
        if client.is_authenticated().await {
            "Authenticated"
        } else {
            "Not authenticated"
        }
    );

    println!("\n📡 Connecting to Komari...");
    client.login().await?;

    let me = client.rpc().me().await?;
    println!("Logged in as: {}", me.username);

    if let Some(token) = client.session_token().await {
        println!("\n🎟️  Session Cookie");
        println!("------------------------");
        println!("{}", token.as_cookie_header());
    }

    println!("\nLogout URL: {}\n", client.logout_url());
    Ok(())
}
