//! Register-level types for the graphics front-end

bitflags! {
    /// The draw-mode register, set by GP0 0xE1. Bits 0 through 10 reappear
    /// verbatim in the status word; bit 11 moves to status bit 15 and the
    /// rectangle-flip bits are not reported at all.
    pub struct DrawMode: u16 {
        /// Texture page X base, in 64-pixel units
        const TEXTURE_PAGE_X = 0x000F;
        /// Texture page Y base, in 256-line units
        const TEXTURE_PAGE_Y = 0x0010;
        /// Semi-transparency blending mode
        const SEMI_TRANSPARENCY = 0x0060;
        /// Texture color depth: 0 = 4-bit CLUT, 1 = 8-bit CLUT, 2 = 15-bit
        const TEXTURE_DEPTH = 0x0180;
        /// Enable dithering from 24 to 15 bits
        const DITHER = 0x0200;
        /// Allow drawing to the displayed field
        const DRAW_TO_DISPLAY = 0x0400;
        /// Disable texturing entirely
        const TEXTURE_DISABLE = 0x0800;
        /// Mirror rectangle textures horizontally
        const RECT_FLIP_X = 0x1000;
        /// Mirror rectangle textures vertically
        const RECT_FLIP_Y = 0x2000;
    }
}

bitflags! {
    /// Mask-bit behavior, set by GP0 0xE6
    pub struct MaskBits: u8 {
        /// Force the mask bit to 1 on every pixel written
        const FORCE_SET = 0x01;
        /// Refuse to overwrite pixels whose mask bit is set
        const CHECK = 0x02;
    }
}

/// Requested DMA flow for the GPU ports, set by GP1 0x04
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DmaDirection {
    Off = 0,
    Fifo = 1,
    CpuToGp0 = 2,
    VramToCpu = 3,
}

/// Video standard of the display output
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VMode {
    Ntsc = 0,
    Pal = 1,
}

/// Color depth of the display output
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DisplayDepth {
    D15Bits = 0,
    D24Bits = 1,
}

/// What the GP0 port does with the next word it receives
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Gp0Mode {
    /// Accumulating command words
    AwaitingCommand,
    /// Consuming pixel data for a CPU-to-VRAM transfer
    ReceivingPixels,
    /// A VRAM-to-CPU transfer is draining through GPUREAD
    SendingPixels,
}

/// The GP0 commands this front-end understands, one variant per opcode so
/// each handler gets exactly the words it expects.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Gp0Op {
    Nop,
    ClearCache,
    FillRect,
    MonoQuad,
    TexturedQuad,
    ShadedTriangle,
    ShadedQuad,
    ImageLoad,
    ImageStore,
    DrawMode,
    TextureWindow,
    DrawAreaTopLeft,
    DrawAreaBottomRight,
    DrawOffset,
    MaskBits,
}

impl Gp0Op {
    /// Look up the command for an opcode byte, or None for opcodes this
    /// front-end does not implement.
    pub fn decode(opcode: u8) -> Option<Gp0Op> {
        match opcode {
            0x00 => Some(Gp0Op::Nop),
            0x01 => Some(Gp0Op::ClearCache),
            0x02 => Some(Gp0Op::FillRect),
            0x28 => Some(Gp0Op::MonoQuad),
            0x2C => Some(Gp0Op::TexturedQuad),
            0x30 => Some(Gp0Op::ShadedTriangle),
            0x38 => Some(Gp0Op::ShadedQuad),
            0xA0 => Some(Gp0Op::ImageLoad),
            0xC0 => Some(Gp0Op::ImageStore),
            0xE1 => Some(Gp0Op::DrawMode),
            0xE2 => Some(Gp0Op::TextureWindow),
            0xE3 => Some(Gp0Op::DrawAreaTopLeft),
            0xE4 => Some(Gp0Op::DrawAreaBottomRight),
            0xE5 => Some(Gp0Op::DrawOffset),
            0xE6 => Some(Gp0Op::MaskBits),
            _ => None,
        }
    }

    /// Total number of words in the command packet, including the word
    /// that carries the opcode
    pub fn length(self) -> u8 {
        match self {
            Gp0Op::Nop => 1,
            Gp0Op::ClearCache => 1,
            Gp0Op::FillRect => 3,
            Gp0Op::MonoQuad => 5,
            Gp0Op::TexturedQuad => 9,
            Gp0Op::ShadedTriangle => 6,
            Gp0Op::ShadedQuad => 8,
            Gp0Op::ImageLoad => 3,
            Gp0Op::ImageStore => 3,
            Gp0Op::DrawMode => 1,
            Gp0Op::TextureWindow => 1,
            Gp0Op::DrawAreaTopLeft => 1,
            Gp0Op::DrawAreaBottomRight => 1,
            Gp0Op::DrawOffset => 1,
            Gp0Op::MaskBits => 1,
        }
    }
}

/// The command staging buffer. GP0 packets are at most 16 words long on
/// this front-end, so a fixed array does.
pub struct CommandFifo {
    buffer: [u32; 16],
    len: u8,
}

impl CommandFifo {
    pub fn new() -> CommandFifo {
        CommandFifo {
            buffer: [0; 16],
            len: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn push(&mut self, word: u32) {
        self.buffer[self.len as usize] = word;
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Word `index` of the packet being staged
    pub fn word(&self, index: usize) -> u32 {
        self.buffer[index]
    }
}

impl Default for CommandFifo {
    fn default() -> CommandFifo {
        CommandFifo::new()
    }
}

/// Progress of a VRAM transfer in either direction. Positions walk the
/// rectangle row by row, one halfword at a time.
pub struct TransferRect {
    x: u16,
    y: u16,
    width: u16,
    height: u16,
    /// Halfwords consumed so far
    index: u32,
}

impl TransferRect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> TransferRect {
        TransferRect {
            x,
            y,
            width,
            height,
            index: 0,
        }
    }

    /// Number of 32-bit words in the transfer: width x height halfwords,
    /// rounded up to an even count
    pub fn word_count(&self) -> u32 {
        let halfwords = u32::from(self.width) * u32::from(self.height);
        (halfwords + 1) / 2
    }

    /// Position of the next halfword, or None once the rectangle is done.
    /// Advances the cursor.
    pub fn next_pos(&mut self) -> Option<(u16, u16)> {
        let halfwords = u32::from(self.width) * u32::from(self.height);
        if self.index >= halfwords {
            return None;
        }

        let x = self.x.wrapping_add((self.index % u32::from(self.width)) as u16);
        let y = self.y.wrapping_add((self.index / u32::from(self.width)) as u16);
        self.index += 1;

        Some((x, y))
    }

    /// True once `2 * word_count()` halfword slots have been walked
    pub fn done(&self) -> bool {
        self.index >= u32::from(self.width) * u32::from(self.height)
    }
}
