use embedded_hal::i2c::{ErrorKind, I2c};
use thiserror::Error;

use crate::config::DisplayConfig;

/// Pixel height of one text row.
pub const CHAR_HEIGHT: u8 = 8;
const CHAR_ADVANCE: u8 = 6;

const CONTROL_COMMAND: u8 = 0x00;
const CONTROL_DATA: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("no display at address {0:#04x}")]
    NotFound(u8),
    #[error("unsupported geometry {width}x{height}")]
    Geometry { width: u8, height: u8 },
    #[error("display bus error: {0}")]
    Bus(ErrorKind),
}

impl DisplayError {
    fn bus<E: embedded_hal::i2c::Error>(e: E) -> Self {
        DisplayError::Bus(e.kind())
    }
}

/// Addresses that acknowledge a one-byte read, in the usual 7-bit range.
pub fn scan_bus<I2C: I2c>(i2c: &mut I2C) -> Vec<u8> {
    let mut probe = [0u8; 1];
    (0x08..=0x77u8)
        .filter(|&address| i2c.read(address, &mut probe).is_ok())
        .collect()
}

pub struct DisplayBuffer {
    width: u8,
    height: u8,
    buffer: Vec<u8>,
}

impl DisplayBuffer {
    fn new(width: u8, height: u8) -> Self {
        DisplayBuffer {
            width,
            height,
            buffer: vec![0u8; width as usize * (height as usize).div_ceil(8)],
        }
    }

    fn clear(&mut self) {
        self.buffer.fill(0);
    }

    fn set_pixel(&mut self, x: u16, y: u16, on: bool) {
        if x >= u16::from(self.width) || y >= u16::from(self.height) {
            return;
        }
        let byte_index = (y / 8) as usize * self.width as usize + x as usize;
        let bit_index = y % 8;

        if on {
            self.buffer[byte_index] |= 1 << bit_index;
        } else {
            self.buffer[byte_index] &= !(1 << bit_index);
        }
    }

    #[cfg(test)]
    fn pixel(&self, x: u16, y: u16) -> bool {
        if x >= u16::from(self.width) || y >= u16::from(self.height) {
            return false;
        }
        let byte_index = (y / 8) as usize * self.width as usize + x as usize;
        (self.buffer[byte_index] >> (y % 8)) & 1 == 1
    }

    fn draw_char(&mut self, x: u16, y: u16, c: char) {
        let font = get_font_data(c);
        for dx in 0..5u16 {
            let column = font[dx as usize];
            for dy in 0..8u16 {
                if (column >> dy) & 1 == 1 {
                    self.set_pixel(x + dx, y + dy, true);
                }
            }
        }
    }

    fn draw_text(&mut self, x: u16, y: u16, text: &str) {
        for (i, c) in text.to_uppercase().chars().enumerate() {
            let cx = x + i as u16 * u16::from(CHAR_ADVANCE);
            if cx >= u16::from(self.width) {
                break;
            }
            self.draw_char(cx, y, c);
        }
    }

    #[cfg(test)]
    fn row_is_blank(&self, row: u8) -> bool {
        let y0 = u16::from(row) * u16::from(CHAR_HEIGHT);
        (0..u16::from(self.width))
            .all(|x| (y0..y0 + u16::from(CHAR_HEIGHT)).all(|y| !self.pixel(x, y)))
    }
}

pub struct Ssd1306<I2C> {
    i2c: I2C,
    address: u8,
    buffer: DisplayBuffer,
}

impl<I2C: I2c> Ssd1306<I2C> {
    /// Scans the bus for `config.address` and runs the init sequence.
    pub fn probe(mut i2c: I2C, config: &DisplayConfig) -> Result<Self, DisplayError> {
        if config.width == 0 || config.height == 0 || config.height > 64 {
            return Err(DisplayError::Geometry { width: config.width, height: config.height });
        }

        let devices = scan_bus(&mut i2c);
        let found: Vec<String> = devices.iter().map(|d| format!("{:#04x}", d)).collect();
        if devices.is_empty() {
            log::warn!("No I2C devices found, check wiring");
            return Err(DisplayError::NotFound(config.address));
        }
        log::info!("I2C devices found: [{}]", found.join(", "));
        if !devices.contains(&config.address) {
            log::warn!("Display not found at address {:#04x}", config.address);
            return Err(DisplayError::NotFound(config.address));
        }

        let mut display = Ssd1306 {
            i2c,
            address: config.address,
            buffer: DisplayBuffer::new(config.width, config.height),
        };
        display.init()?;

        log::info!("SSD1306 {}x{} initialized at address {:#04x}", config.width, config.height, config.address);
        Ok(display)
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let height = self.buffer.height;
        let com_pins = if height <= 32 { 0x02 } else { 0x12 };
        let init_commands = [
            0xAE, 0xD5, 0x80, 0xA8, height - 1, 0xD3, 0x00, 0x40,
            0x8D, 0x14, 0x20, 0x00, 0xA1, 0xC8, 0xDA, com_pins,
            0x81, 0xCF, 0xD9, 0xF1, 0xDB, 0x40, 0xA4, 0xA6, 0xAF,
        ];

        for &cmd in &init_commands {
            self.send_command(cmd)?;
        }

        Ok(())
    }

    fn send_command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.i2c.write(self.address, &[CONTROL_COMMAND, cmd]).map_err(DisplayError::bus)
    }

    pub fn height(&self) -> u8 {
        self.buffer.height
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn draw_text(&mut self, x: u16, y: u16, text: &str) {
        self.buffer.draw_text(x, y, text);
    }

    /// Pushes the whole frame buffer.
    pub fn flush(&mut self) -> Result<(), DisplayError> {
        let last_page = (self.buffer.height - 1) / 8;
        self.send_command(0x21)?;
        self.send_command(0)?;
        self.send_command(self.buffer.width - 1)?;
        self.send_command(0x22)?;
        self.send_command(0)?;
        self.send_command(last_page)?;

        let mut data = [0u8; 17];
        data[0] = CONTROL_DATA;
        for chunk in self.buffer.buffer.chunks(16) {
            data[1..=chunk.len()].copy_from_slice(chunk);
            self.i2c.write(self.address, &data[..=chunk.len()]).map_err(DisplayError::bus)?;
        }

        Ok(())
    }
}

/// The display when it answered at startup, or nothing to draw on.
pub enum Renderer<I2C> {
    Active(Ssd1306<I2C>),
    Unavailable,
}

impl<I2C: I2c> Renderer<I2C> {
    pub fn open(i2c: I2C, config: &DisplayConfig) -> Self {
        match Ssd1306::probe(i2c, config) {
            Ok(display) => Renderer::Active(display),
            Err(e) => {
                log::error!("Display disabled: {}", e);
                Renderer::Unavailable
            }
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Renderer::Active(_))
    }

    pub fn render<S: AsRef<str>>(&mut self, lines: &[S], clear: bool) {
        let display = match self {
            Renderer::Active(display) => display,
            Renderer::Unavailable => {
                log::trace!("Display unavailable, skipping render");
                return;
            }
        };

        if clear {
            display.clear();
        }

        for (i, line) in lines.iter().enumerate() {
            let y = i as u16 * u16::from(CHAR_HEIGHT);
            if y >= u16::from(display.height()) {
                log::warn!("Line '{}' exceeds display height", line.as_ref());
                continue;
            }
            display.draw_text(0, y, line.as_ref());
        }

        if let Err(e) = display.flush() {
            log::warn!("Display error: {}", e);
        }
    }
}

fn get_font_data(c: char) -> [u8; 5] {
    match c {
        '0' => [0x3E, 0x51, 0x49, 0x45, 0x3E],
        '1' => [0x00, 0x42, 0x7F, 0x40, 0x00],
        '2' => [0x62, 0x51, 0x49, 0x49, 0x46],
        '3' => [0x22, 0x41, 0x49, 0x49, 0x36],
        '4' => [0x18, 0x14, 0x12, 0x7F, 0x10],
        '5' => [0x27, 0x45, 0x45, 0x45, 0x39],
        '6' => [0x3C, 0x4A, 0x49, 0x49, 0x30],
        '7' => [0x01, 0x71, 0x09, 0x05, 0x03],
        '8' => [0x36, 0x49, 0x49, 0x49, 0x36],
        '9' => [0x06, 0x49, 0x49, 0x29, 0x1E],
        'A' => [0x7C, 0x12, 0x11, 0x12, 0x7C],
        'B' => [0x7F, 0x49, 0x49, 0x49, 0x36],
        'C' => [0x3E, 0x41, 0x41, 0x41, 0x22],
        'D' => [0x7F, 0x41, 0x41, 0x41, 0x3E],
        'E' => [0x7F, 0x49, 0x49, 0x49, 0x41],
        'F' => [0x7F, 0x09, 0x09, 0x09, 0x01],
        'G' => [0x3E, 0x41, 0x49, 0x49, 0x3A],
        'H' => [0x7F, 0x08, 0x08, 0x08, 0x7F],
        'I' => [0x00, 0x41, 0x7F, 0x41, 0x00],
        'K' => [0x7F, 0x08, 0x14, 0x22, 0x41],
        'L' => [0x7F, 0x40, 0x40, 0x40, 0x40],
        'N' => [0x7F, 0x02, 0x04, 0x08, 0x7F],
        'O' => [0x3E, 0x41, 0x41, 0x41, 0x3E],
        'P' => [0x7F, 0x09, 0x09, 0x09, 0x06],
        'R' => [0x7F, 0x09, 0x19, 0x29, 0x46],
        'S' => [0x26, 0x49, 0x49, 0x49, 0x32],
        'T' => [0x01, 0x01, 0x7F, 0x01, 0x01],
        'W' => [0x7F, 0x20, 0x18, 0x20, 0x7F],
        ':' => [0x00, 0x36, 0x36, 0x00, 0x00],
        '.' => [0x00, 0x60, 0x60, 0x00, 0x00],
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00],
        '-' => [0x08, 0x08, 0x08, 0x08, 0x08],
        _ => [0x7F, 0x41, 0x41, 0x41, 0x7F],
    }
}
