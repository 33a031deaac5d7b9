use log::{debug, info};
use std::io::Write;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use crate::client::models::app_state::App;
use crate::client::models::messages::Message;
use crate::client::views;
use crate::common::models::{RegisterForm, Role};

pub const HELP: &str = "\
Commands:
  /login <email> <password>
  /register <email> <password> <first> <last> <customer|provider> <phone>
  /logout
  /dashboard                      back to your requests or job board
  /refresh
  /new <service id> <lat> <lon>   request a service (customer)
  /online | /offline              toggle the job feed (provider)
  /accept <job> | /decline <job> | /advance <job>
  /open <job>                     job detail with chat
  /chat <text>
  /cancel
  /pay mpesa <254XXXXXXXXX> | /pay cash
  /review <1-5> [comment]
  /location <lat> <lon>           share your position on the open job
  /services | /offer <service id> manage offered services (provider)
  /dismiss <alert id>
  /help | /quit";

#[derive(Debug)]
pub enum Input {
    Messages(Vec<Message>),
    Help,
    Quit,
}

fn id_arg(args: &[&str], what: &str) -> Result<i64, String> {
    args.first()
        .ok_or_else(|| format!("Missing {}.", what))?
        .parse()
        .map_err(|_| format!("The {} must be a number.", what))
}

fn coordinate_args(args: &[&str]) -> Result<(f64, f64), String> {
    match args {
        [lat, lon, ..] => {
            let latitude = lat.parse().map_err(|_| format!("Invalid latitude '{}'.", lat))?;
            let longitude = lon.parse().map_err(|_| format!("Invalid longitude '{}'.", lon))?;
            Ok((latitude, longitude))
        }
        _ => Err("Expected <lat> <lon>.".to_string()),
    }
}

/// Turns one line of input into the messages it stands for.
pub fn parse(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Messages(Vec::new()));
    }
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();
    let rest = line[command.len()..].trim();

    let one = |m: Message| Ok(Input::Messages(vec![m]));
    match command {
        "/help" => Ok(Input::Help),
        "/quit" | "/exit" => Ok(Input::Quit),
        "/login" => match args.as_slice() {
            [email, password] => one(Message::LoginSubmitted { email: email.to_string(), password: password.to_string() }),
            _ => Err("Usage: /login <email> <password>".to_string()),
        },
        "/register" => match args.as_slice() {
            [email, password, first, last, role, phone] => {
                let role = match role.to_ascii_lowercase().as_str() {
                    "customer" => Role::Customer,
                    "provider" => Role::Provider,
                    other => return Err(format!("Unknown role '{}', use customer or provider.", other)),
                };
                one(Message::RegisterSubmitted(RegisterForm {
                    email: email.to_string(),
                    password: password.to_string(),
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    role,
                    phone_number: phone.to_string(),
                }))
            }
            _ => Err("Usage: /register <email> <password> <first> <last> <customer|provider> <phone>".to_string()),
        },
        "/logout" => one(Message::LogoutPressed),
        "/dashboard" | "/requests" => one(Message::OpenDashboard),
        "/refresh" => one(Message::Refresh),
        "/new" => {
            let service = id_arg(&args, "service id")?;
            let (latitude, longitude) = coordinate_args(args.get(1..).unwrap_or(&[]))?;
            one(Message::CreateRequest { service, latitude, longitude })
        }
        "/online" => one(Message::SetOnline(true)),
        "/offline" => one(Message::SetOnline(false)),
        "/accept" => one(Message::AcceptJob(id_arg(&args, "job id")?)),
        "/decline" => one(Message::DeclineJob(id_arg(&args, "job id")?)),
        "/advance" => one(Message::AdvanceJob(id_arg(&args, "job id")?)),
        "/open" => one(Message::OpenJob(id_arg(&args, "job id")?)),
        "/chat" if !rest.is_empty() => Ok(Input::Messages(vec![Message::DraftChanged(rest.to_string()), Message::SendChat])),
        "/chat" => Err("Usage: /chat <text>".to_string()),
        "/cancel" => one(Message::CancelJob),
        "/pay" => match args.as_slice() {
            ["mpesa", phone] => one(Message::PayMpesa { phone_number: phone.to_string() }),
            ["cash"] => one(Message::PayCash),
            _ => Err("Usage: /pay mpesa <254XXXXXXXXX> | /pay cash".to_string()),
        },
        "/review" => {
            let rating: u8 = args
                .first()
                .and_then(|r| r.parse().ok())
                .ok_or_else(|| "Usage: /review <1-5> [comment]".to_string())?;
            let comment = args.get(1..).map(|words| words.join(" ")).filter(|c| !c.is_empty());
            one(Message::SubmitReview { rating, comment })
        }
        "/location" => {
            let (latitude, longitude) = coordinate_args(&args)?;
            one(Message::ShareLocation { latitude, longitude })
        }
        "/services" => one(Message::OpenServices),
        "/offer" => one(Message::ToggleService(id_arg(&args, "service id")?)),
        "/dismiss" => {
            let id = id_arg(&args, "alert id")?;
            one(Message::DismissAlert(id as u64))
        }
        other => Err(format!("Unknown command '{}'. Type /help.", other)),
    }
}

fn render(app: &App) {
    println!("\n{}", views::view(app));
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Interactive shell: reads commands from stdin and redraws whenever input
/// or a background result changes the state. Ends on `/quit` or end of input.
pub async fn run(mut app: App) -> anyhow::Result<()> {
    println!("[CLIENT] Welcome to QuickAssist. Type /help for the list of commands.");
    let mut lines = BufReader::new(stdin()).lines();
    app.start();
    render(&app);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("End of input");
                    break;
                };
                match parse(&line) {
                    Ok(Input::Quit) => break,
                    Ok(Input::Help) => println!("{}", HELP),
                    Ok(Input::Messages(messages)) => {
                        for message in messages {
                            app.update(message);
                        }
                    }
                    Err(problem) => println!("[CLIENT] {}", problem),
                }
                render(&app);
            }
            delivery = app.next_delivery() => {
                match delivery {
                    Some(delivery) => {
                        app.deliver(delivery);
                        render(&app);
                    }
                    None => break,
                }
            }
        }
    }

    info!("Client shutting down");
    Ok(())
}
