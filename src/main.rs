use clap::{Parser, Subcommand, ValueEnum};
use serial_link::config::ConfigLoader;
use serial_link::device::{identify_usb_device, usb_id_hex_to_int};
use serial_link::logging;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Duplex text link to a USB serial device.",
    long_about = "Opens a serial port, prints everything the device sends and forwards stdin lines to it. The inbound pipeline is rebuilt whenever it ends, while the outbound side stays up for the whole session."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print device output and forward stdin lines to the device
    Monitor {
        /// Port path or alias from the configuration
        port: String,

        /// Baud rate, overriding the configuration
        #[arg(short, long)]
        baud: Option<u32>,

        /// Appended to every line sent to the device
        #[arg(long, value_enum, default_value_t = LineEnding::Crlf)]
        line_ending: LineEnding,
    },
    /// Identify a USB device by vendor and product id (hex)
    Identify {
        #[arg(value_parser = parse_usb_id)]
        vid: u16,
        #[arg(value_parser = parse_usb_id)]
        pid: u16,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LineEnding {
    Crlf,
    Lf,
    None,
}

impl LineEnding {
    fn as_str(self) -> &'static str {
        match self {
            Self::Crlf => "\r\n",
            Self::Lf => "\n",
            Self::None => "",
        }
    }
}

fn parse_usb_id(value: &str) -> Result<u16, String> {
    usb_id_hex_to_int(value).ok_or_else(|| format!("'{value}' is not a 16-bit hex id"))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    match args.command {
        Command::Identify { vid, pid } => {
            let info = identify_usb_device(vid, pid);
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Command::Monitor {
            port,
            baud,
            line_ending,
        } => {
            let mut config = ConfigLoader::load()?.into_config();
            if let Some(baud) = baud {
                config.serial.baud_rate = baud;
            }
            logging::init(&config.logging)?;
            monitor::run(&config, &port, line_ending.as_str()).await
        }
    }
}

#[cfg(feature = "async-serial")]
mod monitor {
    use super::BoxError;
    use serial_link::config::Config;
    use serial_link::{
        connect_serial_port, open_serial_port, ConnectOptions, ConsumerError, DecodedChunk,
        TokioSerialOpener,
    };
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tracing::{info, warn};

    pub async fn run(config: &Config, port: &str, line_ending: &str) -> Result<(), BoxError> {
        let name = config.serial.resolve_port(port);
        let mut handle = TokioSerialOpener::handle(name);
        open_serial_port(&mut handle, &config.serial.port_configuration(), None).await?;

        let consumer = |chunk: DecodedChunk| async move {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(chunk.text().as_bytes()).await?;
            stdout.flush().await?;
            Ok::<_, ConsumerError>(())
        };
        let options = ConnectOptions::new()
            .read_loop(config.read_loop.clone())
            .write(config.write.clone());
        let connection = connect_serial_port(handle, consumer, options).await?;

        if let Some(writer) = connection.writer().cloned() {
            let line_ending = line_ending.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Err(error) = writer.write(&format!("{line}{line_ending}")).await {
                        warn!(%error, "stopped forwarding stdin");
                        break;
                    }
                }
            });
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing the port");
                connection.cancel().await;
                Ok(())
            }
            stopped = connection.stopped() => {
                connection.abort("read loop stopped").await;
                stopped.map_err(Into::into)
            }
        }
    }
}

#[cfg(not(feature = "async-serial"))]
mod monitor {
    use super::BoxError;
    use serial_link::config::Config;

    pub async fn run(_config: &Config, _port: &str, _line_ending: &str) -> Result<(), BoxError> {
        Err("serial-link was built without the `async-serial` feature".into())
    }
}
