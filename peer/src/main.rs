use clap::Parser;
use log::{debug, info, warn};
use peer::input::Autopilot;
use peer::session::{Session, SessionState};
use peer::transport::{LoopbackHub, Transport, UdpTransport, ANY_LOBBY};
use shared::{generate_color, PlayerId, Role};
use std::net::SocketAddr;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host a lobby on the bind address
    #[arg(long, conflicts_with = "join")]
    host: bool,

    /// Address of the host to join
    #[arg(short = 'j', long)]
    join: Option<SocketAddr>,

    /// Local address to bind to
    #[arg(short = 'b', long, default_value = "127.0.0.1:7777")]
    bind: SocketAddr,

    /// Platform identity (decimal, hex or account form)
    #[arg(long, default_value = "76561198000000001")]
    id: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Lobby size when hosting
    #[arg(short = 'm', long, default_value = "8")]
    max_members: usize,

    /// Run an in-process match with this many bot clients instead of UDP
    #[arg(long)]
    local_bots: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    if let Some(bots) = args.local_bots {
        info!("Starting local match with {} bots at {} Hz", bots, tick_rate);
        run_local_match(&args, bots, tick_rate).await?;
        return Ok(());
    }

    let local_id = PlayerId::new(&args.id);
    let (role, host_addr) = match (args.host, args.join) {
        (_, Some(addr)) => (Role::Client, Some(addr)),
        _ => (Role::Host, None),
    };

    let transport = UdpTransport::bind(args.bind, local_id.clone(), host_addr).await?;
    let seed = rand::random();
    let mut session = Session::new(transport, &args.name, generate_color(0), role, seed);

    match role {
        Role::Host => {
            let lobby = session.host(args.max_members)?;
            info!("Hosting lobby {} on {}", lobby, args.bind);
        }
        Role::Client => {
            session.join(ANY_LOBBY)?;
            info!("Joining host at {}", host_addr.map(|a| a.to_string()).unwrap_or_default());
        }
    }

    let mut pilot = Autopilot::new(seed);
    run_loop(tick_rate, |dt| {
        let input = pilot.next_input(session.world(), dt);
        session.frame(dt, &input);
        log_stats(&session);
        session.state() != SessionState::Failed
    })
    .await;

    session.leave();
    Ok(())
}

/// Host plus `bots` clients over the in-process transport.
async fn run_local_match(args: &Args, bots: usize, tick_rate: u32) -> Result<(), Box<dyn std::error::Error>> {
    let hub = LoopbackHub::new();
    let host_id = PlayerId::new(&args.id);
    let mut host = Session::new(hub.connect(host_id), &args.name, generate_color(0), Role::Host, 1);
    let lobby = host.host(args.max_members.max(bots + 1))?;

    let mut sessions = vec![(host, Autopilot::new(1))];
    for slot in 1..=bots {
        let id = PlayerId::new(&format!("bot-{}", slot));
        let name = format!("bot {}", slot);
        let seed = slot as u64 + 1;
        let mut bot = Session::new(hub.connect(id), &name, generate_color(slot), Role::Client, seed);
        bot.join(lobby)?;
        sessions.push((bot, Autopilot::new(seed)));
    }

    run_loop(tick_rate, |dt| {
        for (session, pilot) in sessions.iter_mut() {
            let input = pilot.next_input(session.world(), dt);
            session.frame(dt, &input);
        }
        if let Some((host, _)) = sessions.first() {
            log_stats(host);
        }
        sessions
            .iter()
            .all(|(session, _)| session.state() != SessionState::Failed)
    })
    .await;

    for (session, _) in sessions.iter_mut().rev() {
        session.leave();
    }
    Ok(())
}

/// Fixed-rate loop until ctrl-c or until `frame` returns false.
async fn run_loop<F>(tick_rate: u32, mut frame: F)
where
    F: FnMut(f32) -> bool,
{
    let mut interval_timer = interval(Duration::from_secs_f32(1.0 / tick_rate as f32));
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Cap the maximum delta time to 50ms
    let max_delta_time = 1.0 / 20.0;

    // Skip the first tick since it fires immediately
    interval_timer.tick().await;
    let mut last_update = Instant::now();

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }

        let current_time = Instant::now();
        let mut delta_time = (current_time - last_update).as_secs_f32();
        last_update = current_time;

        if delta_time > max_delta_time {
            debug!(
                "Large delta time detected ({:.3}s), capping to {:.3}s",
                delta_time, max_delta_time
            );
            delta_time = max_delta_time;
        }

        if !frame(delta_time) {
            warn!("Session failed, stopping");
            break;
        }
    }
}

fn log_stats<T: Transport>(session: &Session<T>) {
    let world = session.world();
    if world.frame() % 300 != 0 {
        return;
    }
    let local = world.players().local_player();
    info!(
        "[{}] wave {}, {} enemies, {} players, kills {}, money {}, send failures {}",
        session.local_id(),
        world.enemies().wave(),
        world.enemies().len(),
        world.players().len(),
        local.map(|p| p.kills).unwrap_or_default(),
        local.map(|p| p.money).unwrap_or_default(),
        session.network().send_failures()
    );
}
