use std::error::Error;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use http::{Request, Response, StatusCode};
use micro_h1::body::{BodyConfig, BodyStream, DecoderRegistry, boundary_from_content_type};
use micro_h1::connection::HttpConnection;
use micro_h1::handler::{Handler, Reply, make_handler};
use micro_h1::protocol::{CloseAction, ConnectionContext};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    let listener = match TcpListener::bind("127.0.0.1:8080") {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let handler = Arc::new(make_handler(hello_world));
    let config = BodyConfig::server().with_decoders(DecoderRegistry::with_defaults());

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let handler = Arc::clone(&handler);
        let config = config.clone();
        thread::spawn(move || serve(stream, &handler, config));
    }
}

fn serve<H: Handler>(stream: TcpStream, handler: &H, config: BodyConfig) {
    let context = ConnectionContext::new(stream.peer_addr().ok());
    let reader = match stream.try_clone() {
        Ok(reader) => reader,
        Err(e) => {
            error!(cause = %e, "can't split connection");
            return;
        }
    };

    let mut connection = HttpConnection::new(reader, &stream, context, config);
    match connection.process(handler) {
        Ok(CloseAction::Reset) => {
            info!("reply asked for a reset, connection shutdown");
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(_) => info!("finished process, connection shutdown"),
        Err(e) => error!("service has error, cause {}, connection shutdown", e),
    }
}

fn hello_world(
    context: &ConnectionContext,
    request: Request<BodyStream<'_>>,
) -> Result<Reply, Box<dyn Error + Send + Sync>> {
    let path = request.uri().path().to_owned();
    info!(%path, remote = ?context.remote_addr(), "request");

    let boundary = boundary_from_content_type(request.headers());
    let mut body = request.into_body();
    let compressed = body.is_compressed();

    let text = match boundary {
        Some(boundary) => {
            let mut parts = body.multipart(&boundary)?;
            let mut names = Vec::new();
            while let Some(part) = parts.next_part()? {
                names.push(format!("{}: {} bytes", part.name().unwrap_or("-"), part.body().len()));
            }
            names.join("\n")
        }
        None => body.read_as_string()?,
    };
    info!(body = %text, compressed, "receiving request body");

    let response = Response::builder().status(StatusCode::OK).body(format!("Hello World!\r\n{text}"))?;
    let reply = Reply::from(response);

    Ok(if path == "/bye" { reply.close_connection() } else { reply })
}
