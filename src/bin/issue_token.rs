use std::env;

use anyhow::{anyhow, Result};

fn main() -> Result<()> {
    let (user_id, email, role) = parse_args()?;
    let token = proctor_rust::issue_token(&user_id, &email, &role)?;
    println!("{token}");
    Ok(())
}

fn parse_args() -> Result<(String, String, String)> {
    let mut user_id = None;
    let mut email = None;
    let mut role = "student".to_string();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--user" => {
                user_id = Some(args.next().ok_or_else(|| anyhow!("--user missing value"))?);
            }
            "--email" => {
                email = Some(args.next().ok_or_else(|| anyhow!("--email missing value"))?);
            }
            "--role" => {
                role = args.next().ok_or_else(|| anyhow!("--role missing value"))?;
            }
            _ => return Err(anyhow!("Unknown argument: {arg}")),
        }
    }

    let email = email.ok_or_else(|| anyhow!("--email is required"))?;
    let user_id = user_id.unwrap_or_else(|| email.clone());
    Ok((user_id, email, role))
}
