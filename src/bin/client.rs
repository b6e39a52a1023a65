use std::fmt;
use std::io::{self, Write as _};

use clap::Parser;
use jeux::logger::Logger;
use jeux::protocol::{decode_from, encode_into, Packet, PacketType};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "jeux-client",
    version,
    about = "Minimal interactive client for exercising the jeux wire protocol",
    long_about = "Connects to a jeux server and lets you type commands by hand:\n  \
                  login <name>\n  \
                  users\n  \
                  invite <name> <first|second>   (role you are offering the invitee)\n  \
                  accept <id>\n  \
                  revoke <id>\n  \
                  decline <id>\n  \
                  move <id> <cell><X|O>\n  \
                  resign <id>"
)]
struct Args {
    /// Server address to connect to
    #[arg(default_value = "127.0.0.1:7878")]
    addr: String,
}

// ── EVENTS ────────────────────────────────────────────────────────────────────

enum Event<'a> {
    Connecting { addr: &'a str },
    Connected { addr: &'a str },
    Sending { kind: PacketType },
    Received { kind: &'a str, id: u8, role: u8 },
    Disconnected,
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Connecting { addr } => write!(f, "Connecting to {addr}..."),
            Event::Connected { addr } => write!(f, "Connected to {addr}"),
            Event::Sending { kind } => write!(f, "-> {kind:?}"),
            Event::Received { kind, id, role } => {
                write!(f, "<- {kind} id={id} role={role}")
            }
            Event::Disconnected => write!(f, "Connection closed by server"),
        }
    }
}

// ── COMMAND PARSING ───────────────────────────────────────────────────────────

enum Cmd {
    Login(String),
    Users,
    Invite { name: String, role: u8 },
    Accept(u8),
    Revoke(u8),
    Decline(u8),
    Move { id: u8, text: String },
    Resign(u8),
}

impl Cmd {
    fn parse(line: &str) -> Result<Self, String> {
        let mut t = line.split_whitespace();
        match t.next().unwrap_or("").to_ascii_lowercase().as_str() {
            "login" => Ok(Cmd::Login(t.next().ok_or("usage: login <name>")?.to_string())),
            "users" => Ok(Cmd::Users),
            "invite" => {
                let name = t.next().ok_or("usage: invite <name> <first|second>")?;
                let role = match t.next().unwrap_or("").to_ascii_lowercase().as_str() {
                    "first" => 1,
                    "second" => 2,
                    _ => return Err("role must be 'first' or 'second'".into()),
                };
                Ok(Cmd::Invite {
                    name: name.to_string(),
                    role,
                })
            }
            "accept" => Ok(Cmd::Accept(parse_id(&mut t)?)),
            "revoke" => Ok(Cmd::Revoke(parse_id(&mut t)?)),
            "decline" => Ok(Cmd::Decline(parse_id(&mut t)?)),
            "move" => {
                let id = parse_id(&mut t)?;
                let text = t.next().ok_or("usage: move <id> <cell><X|O>")?.to_string();
                Ok(Cmd::Move { id, text })
            }
            "resign" => Ok(Cmd::Resign(parse_id(&mut t)?)),
            "" => Err("empty input".into()),
            other => Err(format!("unknown command '{other}'")),
        }
    }

    fn into_packet(self) -> Packet {
        match self {
            Cmd::Login(name) => Packet::new(PacketType::Login, 0, 0, name.into_bytes()),
            Cmd::Users => Packet::empty(PacketType::Users, 0, 0),
            Cmd::Invite { name, role } => Packet::new(PacketType::Invite, 0, role, name.into_bytes()),
            Cmd::Accept(id) => Packet::empty(PacketType::Accept, id, 0),
            Cmd::Revoke(id) => Packet::empty(PacketType::Revoke, id, 0),
            Cmd::Decline(id) => Packet::empty(PacketType::Decline, id, 0),
            Cmd::Move { id, text } => Packet::new(PacketType::Move, id, 0, text.into_bytes()),
            Cmd::Resign(id) => Packet::empty(PacketType::Resign, id, 0),
        }
    }
}

fn parse_id<'a>(t: &mut impl Iterator<Item = &'a str>) -> Result<u8, String> {
    t.next()
        .ok_or("missing id")?
        .parse::<u8>()
        .map_err(|_| "id must be a number 0-255".to_string())
}

fn print_prompt() {
    print!("> ");
    io::stdout().flush().ok();
}

// ── MAIN ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let log = Logger::from_env();

    log.info(Event::Connecting { addr: &args.addr });
    let stream = match TcpStream::connect(&args.addr).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to connect to {}: {e}", args.addr);
            std::process::exit(1);
        }
    };
    log.info(Event::Connected { addr: &args.addr });

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = read_half;
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    print_prompt();
    loop {
        tokio::select! {
            incoming = decode_from(&mut reader) => {
                match incoming {
                    Ok(pkt) => {
                        let kind = pkt.kind().map(|k| format!("{k:?}")).unwrap_or_else(|| format!("0x{:02x}", pkt.header.kind));
                        log.info(Event::Received { kind: &kind, id: pkt.header.id, role: pkt.header.role });
                        if !pkt.payload.is_empty() {
                            println!("{}", pkt.payload_str());
                        }
                        print_prompt();
                    }
                    Err(_) => {
                        log.info(Event::Disconnected);
                        println!("\nDisconnected from server.");
                        break;
                    }
                }
            }
            line = stdin_lines.next_line() => {
                let raw = match line {
                    Ok(Some(l)) => l,
                    _ => {
                        println!("\nInput closed.");
                        break;
                    }
                };
                match Cmd::parse(raw.trim()) {
                    Ok(cmd) => {
                        let pkt = cmd.into_packet();
                        log.verbose(Event::Sending { kind: pkt.kind().unwrap_or(PacketType::Ack) });
                        if let Err(e) = encode_into(&mut write_half, &pkt).await {
                            eprintln!("send failed: {e}");
                            break;
                        }
                    }
                    Err(reason) => println!("? {reason}"),
                }
                print_prompt();
            }
        }
    }
}
