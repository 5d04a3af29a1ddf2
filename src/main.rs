//! stm8boot - STM8 ROM bootloader programmer
//!
//! Reads, writes and erases STM8 flash, data EEPROM and option bytes
//! through the factory bootloader, over UART (direct, reply mode or
//! two-wire) or SPI (Linux spidev or a serprog USB bridge). No debug
//! probe needed.

mod cli;
mod commands;
mod transports;

use clap::Parser;
use cli::{Cli, Commands};
use commands::write::WriteArgs;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let conn = &cli.connection;
    let transport = transports::open_transport(conn)?;
    let interface = transports::initial_interface(conn);
    let reset = conn.reset != cli::ResetArg::None;
    let uart_mode = transports::uart_mode_override(conn);

    let mut session = commands::connect(transport, interface, reset, uart_mode)?;

    match cli.command {
        Commands::Probe => commands::probe::run(&mut session),
        Commands::Write {
            files,
            base,
            erase,
            mass_erase,
            verify,
            go,
            clip,
            cut,
            fill,
            copy,
            move_range,
        } => commands::write::run(
            &mut session,
            &WriteArgs {
                files,
                base,
                erase,
                mass_erase,
                verify,
                go,
                clip,
                cut,
                fill,
                copy,
                move_range,
            },
        ),
        Commands::Read { output, start, end } => {
            commands::read::run(&mut session, &output, start, end)
        }
        Commands::Erase { mass, start, end } => {
            let range = start.zip(end);
            commands::erase::run(&mut session, mass, range)
        }
        Commands::Verify { files, base } => commands::verify::run(&mut session, &files, base),
        Commands::Go { address } => commands::go::run(&mut session, address),
    }
}
