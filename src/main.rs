use livecast::signaling::{ChannelClient, SignalMessage};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(url), rooms) = (args.next(), args.collect::<Vec<_>>()) else {
        eprintln!("usage: livecast <ws-url> <room>...");
        std::process::exit(2);
    };
    if rooms.is_empty() {
        eprintln!("usage: livecast <ws-url> <room>...");
        std::process::exit(2);
    }

    println!("   livecast signal tap");
    println!("   Channel {}", url);
    println!("   Rooms {}", rooms.join(", "));
    println!("   Press Ctrl+C to stop\n");

    let client = rooms
        .iter()
        .fold(ChannelClient::new(url), |client, room| client.join(room.as_str()));

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<SignalMessage>();
    // the tap never sends, but the client stops once its outbound queue closes
    let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel::<SignalMessage>();
    let mut client_task = tokio::spawn(client.run(inbound_tx, outbound_rx));

    let mut interrupted = false;
    loop {
        tokio::select! {
            Some(msg) = inbound_rx.recv() => log_signal(&msg),
            result = &mut client_task => {
                result??;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        info!("Interrupted, closing tap");
        client_task.abort();
    }
    Ok(())
}

fn log_signal(msg: &SignalMessage) {
    match msg {
        SignalMessage::Offer { room, offer } => {
            info!("[{}] offer ({} bytes of SDP)", room, offer.sdp.len());
        }
        SignalMessage::Answer { room, answer } => {
            info!("[{}] answer ({} bytes of SDP)", room, answer.sdp.len());
        }
        SignalMessage::IceCandidate { room, candidate } => {
            info!(
                "[{}] ice_candidate mid={:?} {}",
                room, candidate.sdp_mid, candidate.candidate
            );
        }
        SignalMessage::StreamEnded { room } => info!("[{}] stream_ended", room),
    }
}
