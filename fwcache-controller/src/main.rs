// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

#![no_std]
#![no_main]

mod spi_link;
mod usb_transport;

use defmt_rtt as _;
use embedded_hal::digital::OutputPin;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;
use fwcache_common::storage::MICRON_MANUFACTURER_ID;
use fwcache_common::{dispatch, FirmwareCache, SpiFlash};
use rp2040_hal as hal;
use hal::clocks::Clock;
use hal::fugit::RateExtU32;
use hal::gpio::{FunctionSpi, PinState};
use spi_link::SpiLink;
use usb_device::class_prelude::UsbBusAllocator;
use usb_transport::UsbTransport;

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

const XTAL_FREQ_HZ: u32 = 12_000_000;
const FLASH_SPI_HZ: u32 = 8_000_000;

#[entry]
fn main() -> ! {
    defmt::println!("fwcache controller init");

    let mut pac = defmt::unwrap!(hal::pac::Peripherals::take());
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = defmt::unwrap!(hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok());

    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );
    let mut led_pin = pins.gpio25.into_push_pull_output();

    // External flash on SPI0: MISO 16, CS 17, SCK 18, MOSI 19.
    let miso = pins.gpio16.into_function::<FunctionSpi>();
    let sclk = pins.gpio18.into_function::<FunctionSpi>();
    let mosi = pins.gpio19.into_function::<FunctionSpi>();
    let cs = pins.gpio17.into_push_pull_output_in_state(PinState::High);
    let spi = hal::spi::Spi::<_, _, _, 8>::new(pac.SPI0, (mosi, miso, sclk)).init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        FLASH_SPI_HZ.Hz(),
        embedded_hal::spi::MODE_0,
    );

    let mut flash = SpiFlash::new(SpiLink(spi), cs);
    match flash.probe(MICRON_MANUFACTURER_ID) {
        Ok(()) => defmt::println!("Flash: device found"),
        // Serve anyway: a part with another ID may still work, a missing one
        // fails each request at the storage layer.
        Err(e) => defmt::error!("Flash: probe failed: {}", e),
    }
    let mut cache: FirmwareCache<_> = FirmwareCache::new(flash);

    let usb_bus = defmt::unwrap!(cortex_m::singleton!(
        : UsbBusAllocator<hal::usb::UsbBus> = UsbBusAllocator::new(hal::usb::UsbBus::new(
            pac.USBCTRL_REGS,
            pac.USBCTRL_DPRAM,
            clocks.usb_clock,
            true,
            &mut pac.RESETS,
        ))
    ));
    let mut transport = defmt::unwrap!(UsbTransport::new(usb_bus));

    defmt::println!("USB CDC initialized, serving requests");
    led_pin.set_high().ok();

    loop {
        transport.poll();

        if let Some(request) = transport.try_receive() {
            let reply = dispatch(&mut cache, &request);
            defmt::debug!(
                "Request feature={} command=0x{:02x}: {}",
                request.feature,
                request.command,
                defmt::Debug2Format(&reply)
            );
            transport.send(&reply);
        }
    }
}
