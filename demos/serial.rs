use std::{env, time::Duration};

use flexi_logger::Logger;
use inquire::Select;
use ruideng_rd60xx::{config::PortConfig, psu::Rd60xx};

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 115200;
// The PSU can take a while to respond, a reasonably large time out is required.
const SERIAL_TIMEOUT_MS: u64 = 300;
const MODBUS_UNIT_ID: u8 = 0x01;
const OUTPUT_VOLTAGE: f32 = 12.0;
const CURRENT_LIMIT: f32 = 0.1;
const STABILIZATION_DELAY_MS: u64 = 1000;

fn main() {
    let _logger = Logger::try_with_env_or_str("info")
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    println!("Using port: {}", port_name);

    let config = PortConfig::new(port_name, BAUD_RATE, MODBUS_UNIT_ID)
        .with_timeout(Duration::from_millis(SERIAL_TIMEOUT_MS));
    let mut psu = Rd60xx::serial(config);
    psu.connect().expect("Failed to open serial port");

    // Start from a known state.
    psu.off().unwrap();
    println!("Output: {}", psu.read_output_state().unwrap());

    println!("Product model:    {}", psu.read_product_model().unwrap());
    println!("Serial number:    {}", psu.read_serial_number().unwrap());
    println!("Firmware version: V{:.2}", psu.read_firmware_version().unwrap());
    println!("Temperature:      {}", psu.read_temperature_celsius().unwrap());
    println!("Temperature:      {}", psu.read_temperature_fahrenheit().unwrap());
    println!("Input voltage:    {:05.2}V", psu.read_input_voltage().unwrap());
    println!("Keyboard lock:    {}", psu.read_keyboard_lock().unwrap());
    println!("Protection:       {}", psu.read_protection_status().unwrap());
    println!("Control mode:     {}", psu.read_control_mode().unwrap());

    psu.set_voltage(OUTPUT_VOLTAGE).unwrap();
    println!("Voltage setting:  {:06.3}V", psu.read_voltage_setting().unwrap());

    psu.set_current(CURRENT_LIMIT).unwrap();
    println!("Current setting:  {:06.3}A", psu.read_current_setting().unwrap());

    psu.on().unwrap();
    println!("Output: {}", psu.read_output_state().unwrap());

    // Wait for output to stabilize
    std::thread::sleep(Duration::from_millis(STABILIZATION_DELAY_MS));

    println!("Output voltage:   {:06.3}V", psu.read_output_voltage().unwrap());
    println!("Output current:   {:06.3}A", psu.read_output_current().unwrap());
    println!("Output power:     {:06.3}W", psu.read_output_power().unwrap());

    psu.off().unwrap();
    psu.disconnect();
}
