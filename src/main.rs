//! Account console over the identity core. Register, log in, confirm an email, edit a profile
//! and walk through password recovery from a line-oriented prompt. `--confirm <token>` runs a single
//! confirmation and exits, which is what a confirmation-link front door forwards to.

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use starport::player::{optional_field, parse_music_tags};
use starport::{Identity, IdentityConfig, IdentityError, NewPlayer, PlayerId, ProfileChanges, RecoverySession};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--store <path>]                 # interactive console\n  {program} [--store <path>] --confirm <token>  # confirm an email and exit\n\nInteractive commands:\n  register <alias> <email> <password> [full name...]\n  login <alias|email> <password>\n  confirm <token>\n  resend <email>\n  show <alias|email>\n  update <player-id> <alias|name|email|picture|ship|music> [value...]\n  recover <email>            start (or restart) password recovery\n  code <6 digits>\n  newpass <password> <confirm>\n  cancel                     abandon recovery\n  help | quit\n\nEnvironment: STARPORT_STORE, STARPORT_RECOVERY_TTL_SECS, STARPORT_MAIL_API_URL, STARPORT_MAIL_API_KEY,\n  STARPORT_MAIL_SENDER, STARPORT_CONFIRM_URL, RUST_LOG"
    );
}

fn report(err: &IdentityError) {
    println!("error [{}]: {}", err.code_str(), err.public_message());
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    let mut cfg = IdentityConfig::from_env();
    let mut confirm_token: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--store" => {
                if i + 1 >= args.len() { eprintln!("--store requires a value"); print_usage(&program); std::process::exit(2); }
                cfg.store_path = PathBuf::from(&args[i + 1]);
                i += 2; continue;
            }
            "--confirm" => {
                if i + 1 >= args.len() { eprintln!("--confirm requires a token"); print_usage(&program); std::process::exit(2); }
                confirm_token = Some(args[i + 1].clone());
                i += 2; continue;
            }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            other => { eprintln!("unknown argument '{}'", other); print_usage(&program); std::process::exit(2); }
        }
    }

    let identity = Identity::shared(&cfg)?;

    if let Some(token) = confirm_token {
        return match identity.service.confirm(&token) {
            Ok(p) => { println!("email {} confirmed", p.email); Ok(()) }
            Err(e) => { report(&e); std::process::exit(if e.http_status() < 500 { 1 } else { 3 }); }
        };
    }

    info!(target: "starport", "console started, store='{}'", cfg.store_path.display());
    run_console(&identity)
}

fn run_console(identity: &Identity) -> Result<()> {
    let stdin = io::stdin();
    let mut recovery: Option<RecoverySession> = None;
    loop {
        if let Some(s) = recovery.take() {
            recovery = match identity.recovery.tick(s) {
                Ok(s) => Some(s),
                Err(rej) => { report(&rej.error); Some(rej.session) }
            };
        }
        print!("{}> ", recovery.as_ref().map(|s| s.stage().as_str()).unwrap_or("starport"));
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 { break; }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((cmd, rest)) = parts.split_first() else { continue; };

        match (*cmd, rest) {
            ("quit" | "exit", _) => break,
            ("help", _) => print_usage("starport"),
            ("register", [alias, email, password, name @ ..]) => {
                let form = NewPlayer {
                    alias: alias.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                    full_name: name.join(" "),
                    ..Default::default()
                };
                match identity.service.register(form) {
                    Ok(p) => println!("registered {} ({}); check {} for the confirmation link", p.alias, p.id, p.email),
                    Err(e @ IdentityError::DeliveryFailure(_)) => {
                        report(&e);
                        println!("the account was created; use 'resend {}' to retry the mail", email);
                    }
                    Err(e) => report(&e),
                }
            }
            ("login", [identifier, password]) => match identity.service.authenticate(identifier, password) {
                Ok(p) => println!("hello {}! (id {}, confirmed: {})", p.alias, p.id, p.email_confirmed),
                Err(e) => report(&e),
            },
            ("confirm", [token]) => match identity.service.confirm(token) {
                Ok(p) => println!("email {} confirmed", p.email),
                Err(e) => report(&e),
            },
            ("resend", [email]) => match identity.service.resend_confirmation(email) {
                Ok(()) => println!("confirmation link sent if pending"),
                Err(e) => report(&e),
            },
            ("show", [identifier]) => {
                let repo = identity.service.repository();
                repo.reload()?;
                match repo.get_by_alias(identifier).or_else(|| repo.get_by_email(identifier)) {
                    Some(p) => println!(
                        "{} | {} | {} | confirmed={} | picture={} | ship={} | music={}",
                        p.id, p.alias, p.full_name, p.email_confirmed,
                        p.profile_picture.as_deref().unwrap_or("-"),
                        p.spaceship_image.as_deref().unwrap_or("-"),
                        p.favorite_music.join(", ")
                    ),
                    None => println!("no such player"),
                }
            }
            ("update", [id, field, value @ ..]) => {
                let Ok(id) = id.parse::<PlayerId>() else { println!("'{}' is not a player id", id); continue; };
                let value = value.join(" ");
                let mut changes = ProfileChanges::default();
                match *field {
                    "alias" => changes.alias = Some(value),
                    "name" => changes.full_name = Some(value),
                    "email" => changes.email = Some(value),
                    "picture" => changes.profile_picture = Some(optional_field(&value)),
                    "ship" => changes.spaceship_image = Some(optional_field(&value)),
                    "music" => changes.favorite_music = Some(parse_music_tags(&value)),
                    other => { println!("unknown field '{}'", other); continue; }
                }
                match identity.service.update_profile(id, changes) {
                    Ok(p) => println!("updated {}", p.alias),
                    Err(e) => report(&e),
                }
            }
            ("recover", [email]) => {
                let session = recovery.take().unwrap_or_default();
                recovery = match identity.recovery.submit_email(session, email) {
                    Ok(s) => { println!("code sent, it expires in {} minutes", identity.recovery.code_ttl().num_minutes()); Some(s) }
                    Err(rej) => { report(&rej.error); Some(rej.session) }
                };
            }
            ("code", [code]) => {
                let session = recovery.take().unwrap_or_default();
                recovery = match identity.recovery.submit_code(session, code) {
                    Ok(s) => { println!("code accepted, choose a new password"); Some(s) }
                    Err(rej) => { report(&rej.error); Some(rej.session) }
                };
            }
            ("newpass", [new, confirm]) => {
                let session = recovery.take().unwrap_or_default();
                match identity.recovery.submit_password(session, new, confirm) {
                    Ok(()) => println!("password updated"),
                    Err(rej) => { report(&rej.error); recovery = Some(rej.session); }
                }
            }
            ("cancel", _) => match recovery.take() {
                Some(s) => { identity.recovery.cancel(s); println!("recovery cancelled"); }
                None => println!("no recovery in progress"),
            },
            _ => println!("unrecognised command; type 'help'"),
        }
    }
    Ok(())
}
