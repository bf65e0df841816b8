use std::time::{Duration, Instant};

use flybrix_serial::{
    protocol::{
        config::Config,
        frame::decode_frame,
        message::{CommandMask, Header, MessageType, Response},
        Decode, MessageEncoder,
    },
    serial::{self, SerialTransport},
    Transport, TransportError,
};
use log::{info, warn};

fn main() -> Result<(), TransportError> {
    simplelog::TermLogger::init(
        log::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Always,
    )
    .unwrap();

    let ports = serial::find_ports()?;
    let Some(port) = ports.first() else {
        warn!("No flight controller found");
        return Ok(());
    };
    info!("Connecting to {}", port.port_name);
    let mut transport = SerialTransport::open(&port.port_name)?;

    // Ask for the configuration and an acknowledgment.
    let request = MessageEncoder::<16>::new(
        MessageType::Command,
        (CommandMask::REQ_EEPROM_DATA | CommandMask::REQ_RESPONSE).bits(),
    )
    .unwrap();
    transport.write_bytes(&request.finish())?;

    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        let Some(frame) = transport.read_frame()? else {
            std::thread::sleep(Duration::from_millis(10));
            continue;
        };
        let Ok(data) = decode_frame(&frame) else {
            warn!("Dropping malformed frame");
            continue;
        };

        let mut body = data.as_slice();
        match Header::decode(&mut body) {
            Ok(header) if header.message_type == MessageType::Response => {
                let response = Response::decode(&mut data.as_slice()).unwrap();
                info!("Acknowledged {:?} of {:?}", response.ack, response.mask);
                break;
            }
            Ok(header) if header.mask == CommandMask::SET_EEPROM_DATA.bits() => {
                match Config::decode(&mut body) {
                    Ok(config) => info!("Configuration of {} (v{}): {:#?}", config.name, config.version, config),
                    Err(err) => warn!("Unreadable configuration: {}", err),
                }
            }
            Ok(header) => info!("{:?} message with mask {:#010x}", header.message_type, header.mask),
            Err(err) => warn!("{}", err),
        }
    }

    Ok(())
}
