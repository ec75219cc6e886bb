use anyhow::Result;
use colored::Colorize;
use grantstore::AuthorizationGrant;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_grant(grant: &AuthorizationGrant, reveal: bool) -> Result<()> {
    let shown = if reveal { grant.clone() } else { redacted(grant) };
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

/// Keeps the first four characters of each credential value.
fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}****")
}

fn redacted(grant: &AuthorizationGrant) -> AuthorizationGrant {
    let mut grant = grant.clone();
    if let Some(state) = grant.state.as_mut() {
        *state = redact(state);
    }
    for token in [
        grant.authorization_code.as_mut(),
        grant.access_token.as_mut(),
        grant.refresh_token.as_mut(),
    ]
    .into_iter()
    .flatten()
    {
        token.value = redact(&token.value);
    }
    grant
}
