//! The graphics command front-end.
//!
//! The GPU exposes two 32-bit ports. GP0 carries drawing commands and bulk
//! pixel data: words accumulate in a staging buffer until the packet is
//! complete, then the handler for the opcode runs. GP1 carries control
//! commands that take effect immediately. Reads return the GPUREAD latch
//! (which drains VRAM-to-CPU transfers) and the packed status word.

use super::renderer::{Color, Renderer, TexCoord, Vertex};
use super::structs::{
    CommandFifo, DisplayDepth, DmaDirection, DrawMode, Gp0Mode, Gp0Op, MaskBits, TransferRect,
    VMode,
};
use crate::devices::mem::Vram;

/// A recorded fill-rectangle request. Rasterization of fills is not
/// implemented; the most recent one is latched so it can be inspected.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FillRect {
    pub color: Color,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

pub struct Gpu {
    vram: Vram,
    renderer: Box<dyn Renderer>,

    /// Words of the packet currently being staged
    fifo: CommandFifo,
    /// Command words still owed before the staged packet can run
    remaining_words: u8,
    /// The command the staged packet belongs to
    current_op: Option<Gp0Op>,
    /// What GP0 does with the next word
    mode: Gp0Mode,
    /// Progress of the active VRAM transfer, either direction
    transfer: Option<TransferRect>,
    /// Value returned by GPUREAD when no transfer is draining
    read_latch: u32,

    // Latched drawing state
    draw_mode: DrawMode,
    texture_window: u32,
    draw_area_left: u16,
    draw_area_top: u16,
    draw_area_right: u16,
    draw_area_bottom: u16,
    draw_offset: (i16, i16),
    mask_bits: MaskBits,
    last_fill: Option<FillRect>,

    // Latched display state
    display_disabled: bool,
    interrupt: bool,
    dma_direction: DmaDirection,
    display_vram_start: (u16, u16),
    display_horiz_range: (u16, u16),
    display_line_range: (u16, u16),
    /// Horizontal resolution selector, fields of GP1 0x08
    hres1: u8,
    hres2: bool,
    vres_high: bool,
    vmode: VMode,
    display_depth: DisplayDepth,
    interlaced: bool,
}

impl Gpu {
    pub fn new(renderer: Box<dyn Renderer>) -> Gpu {
        let mut gpu = Gpu {
            vram: Vram::new(),
            renderer,
            fifo: CommandFifo::new(),
            remaining_words: 0,
            current_op: None,
            mode: Gp0Mode::AwaitingCommand,
            transfer: None,
            read_latch: 0,
            draw_mode: DrawMode::empty(),
            texture_window: 0,
            draw_area_left: 0,
            draw_area_top: 0,
            draw_area_right: 0,
            draw_area_bottom: 0,
            draw_offset: (0, 0),
            mask_bits: MaskBits::empty(),
            last_fill: None,
            display_disabled: true,
            interrupt: false,
            dma_direction: DmaDirection::Off,
            display_vram_start: (0, 0),
            display_horiz_range: (0, 0),
            display_line_range: (0, 0),
            hres1: 0,
            hres2: false,
            vres_high: false,
            vmode: VMode::Ntsc,
            display_depth: DisplayDepth::D15Bits,
            interlaced: false,
        };
        gpu.reset();
        gpu
    }

    /// GP1 0x00: reset every latched register and wipe VRAM
    fn reset(&mut self) {
        self.fifo.clear();
        self.remaining_words = 0;
        self.current_op = None;
        self.mode = Gp0Mode::AwaitingCommand;
        self.transfer = None;
        self.read_latch = 0;

        self.draw_mode = DrawMode::empty();
        self.texture_window = 0;
        self.draw_area_left = 0;
        self.draw_area_top = 0;
        self.draw_area_right = 0;
        self.draw_area_bottom = 0;
        self.draw_offset = (0, 0);
        self.mask_bits = MaskBits::empty();

        self.display_disabled = true;
        self.interrupt = false;
        self.dma_direction = DmaDirection::Off;
        self.display_vram_start = (0, 0);
        self.display_horiz_range = (0x200, 0xC00);
        self.display_line_range = (0x10, 0x100);
        self.hres1 = 0;
        self.hres2 = false;
        self.vres_high = false;
        self.vmode = VMode::Ntsc;
        self.display_depth = DisplayDepth::D15Bits;
        self.interlaced = false;

        self.vram.clear();
    }

    /// Handle a word written to the GP0 command port
    pub fn gp0(&mut self, word: u32) {
        if self.mode == Gp0Mode::ReceivingPixels {
            self.receive_pixels(word);
            return;
        }

        if self.current_op.is_none() {
            let opcode = (word >> 24) as u8;
            match Gp0Op::decode(opcode) {
                Some(op) => {
                    self.current_op = Some(op);
                    self.remaining_words = op.length();
                    self.fifo.clear();
                }
                None => {
                    log::warn!("unimplemented GP0 opcode 0x{:02X} (word 0x{:08X})", opcode, word);
                    return;
                }
            }
        }

        self.fifo.push(word);
        self.remaining_words -= 1;

        if self.remaining_words == 0 {
            if let Some(op) = self.current_op.take() {
                self.run_gp0(op);
            }
            self.fifo.clear();
        }
    }

    /// One word of pixel data for the active CPU-to-VRAM transfer: two
    /// little-endian halfword pixels
    fn receive_pixels(&mut self, word: u32) {
        if let Some(rect) = self.transfer.as_mut() {
            for half in [word as u16, (word >> 16) as u16] {
                if let Some((x, y)) = rect.next_pos() {
                    self.vram.store16(x, y, half);
                }
            }

            if rect.done() {
                self.transfer = None;
                self.mode = Gp0Mode::AwaitingCommand;
            }
        }
    }

    fn run_gp0(&mut self, op: Gp0Op) {
        match op {
            Gp0Op::Nop => (),
            Gp0Op::ClearCache => (),
            Gp0Op::FillRect => self.op_fill_rect(),
            Gp0Op::MonoQuad => self.op_mono_quad(),
            Gp0Op::TexturedQuad => self.op_textured_quad(),
            Gp0Op::ShadedTriangle => self.op_shaded_triangle(),
            Gp0Op::ShadedQuad => self.op_shaded_quad(),
            Gp0Op::ImageLoad => self.op_image_load(),
            Gp0Op::ImageStore => self.op_image_store(),
            Gp0Op::DrawMode => self.op_draw_mode(),
            Gp0Op::TextureWindow => self.op_texture_window(),
            Gp0Op::DrawAreaTopLeft => self.op_draw_area_top_left(),
            Gp0Op::DrawAreaBottomRight => self.op_draw_area_bottom_right(),
            Gp0Op::DrawOffset => self.op_draw_offset(),
            Gp0Op::MaskBits => self.op_mask_bits(),
        }
    }

    fn op_fill_rect(&mut self) {
        let color = Color::from_word(self.fifo.word(0));
        let pos = self.fifo.word(1);
        let size = self.fifo.word(2);

        let fill = FillRect {
            color,
            x: pos as u16,
            y: (pos >> 16) as u16,
            width: size as u16,
            height: (size >> 16) as u16,
        };

        log::debug!("fill rectangle {:?}", fill);
        self.last_fill = Some(fill);
    }

    fn op_mono_quad(&mut self) {
        let color = Color::from_word(self.fifo.word(0));
        let vertices = [
            Vertex::from_word(self.fifo.word(1)),
            Vertex::from_word(self.fifo.word(2)),
            Vertex::from_word(self.fifo.word(3)),
            Vertex::from_word(self.fifo.word(4)),
        ];

        self.renderer.push_quad(vertices, [color; 4]);
    }

    fn op_textured_quad(&mut self) {
        let color = Color::from_word(self.fifo.word(0));
        let vertices = [
            Vertex::from_word(self.fifo.word(1)),
            Vertex::from_word(self.fifo.word(3)),
            Vertex::from_word(self.fifo.word(5)),
            Vertex::from_word(self.fifo.word(7)),
        ];
        let texcoords = [
            TexCoord::from_word(self.fifo.word(2)),
            TexCoord::from_word(self.fifo.word(4)),
            TexCoord::from_word(self.fifo.word(6)),
            TexCoord::from_word(self.fifo.word(8)),
        ];
        // CLUT rides in the high halfword of the first texel word, the
        // texture page in the high halfword of the second
        let clut = (self.fifo.word(2) >> 16) as u16;
        let page = (self.fifo.word(4) >> 16) as u16;

        self.renderer
            .push_textured_quad(vertices, color, texcoords, clut, page);
    }

    fn op_shaded_triangle(&mut self) {
        let colors = [
            Color::from_word(self.fifo.word(0)),
            Color::from_word(self.fifo.word(2)),
            Color::from_word(self.fifo.word(4)),
        ];
        let vertices = [
            Vertex::from_word(self.fifo.word(1)),
            Vertex::from_word(self.fifo.word(3)),
            Vertex::from_word(self.fifo.word(5)),
        ];

        self.renderer.push_triangle(vertices, colors);
    }

    fn op_shaded_quad(&mut self) {
        let colors = [
            Color::from_word(self.fifo.word(0)),
            Color::from_word(self.fifo.word(2)),
            Color::from_word(self.fifo.word(4)),
            Color::from_word(self.fifo.word(6)),
        ];
        let vertices = [
            Vertex::from_word(self.fifo.word(1)),
            Vertex::from_word(self.fifo.word(3)),
            Vertex::from_word(self.fifo.word(5)),
            Vertex::from_word(self.fifo.word(7)),
        ];

        self.renderer.push_quad(vertices, colors);
    }

    fn transfer_rect_from_packet(&self) -> TransferRect {
        let pos = self.fifo.word(1);
        let size = self.fifo.word(2);

        TransferRect::new(
            (pos & 0x3FF) as u16,
            ((pos >> 16) & 0x1FF) as u16,
            size as u16,
            (size >> 16) as u16,
        )
    }

    fn op_image_load(&mut self) {
        let rect = self.transfer_rect_from_packet();

        if rect.word_count() == 0 {
            return;
        }

        self.transfer = Some(rect);
        self.mode = Gp0Mode::ReceivingPixels;
    }

    fn op_image_store(&mut self) {
        let rect = self.transfer_rect_from_packet();

        if rect.word_count() == 0 {
            return;
        }

        self.transfer = Some(rect);
        self.mode = Gp0Mode::SendingPixels;
    }

    fn op_draw_mode(&mut self) {
        self.draw_mode = DrawMode::from_bits_truncate(self.fifo.word(0) as u16);
    }

    fn op_texture_window(&mut self) {
        self.texture_window = self.fifo.word(0) & 0xF_FFFF;
    }

    fn op_draw_area_top_left(&mut self) {
        let word = self.fifo.word(0);
        self.draw_area_left = (word & 0x3FF) as u16;
        self.draw_area_top = ((word >> 10) & 0x3FF) as u16;
    }

    fn op_draw_area_bottom_right(&mut self) {
        let word = self.fifo.word(0);
        self.draw_area_right = (word & 0x3FF) as u16;
        self.draw_area_bottom = ((word >> 10) & 0x3FF) as u16;
    }

    fn op_draw_offset(&mut self) {
        let word = self.fifo.word(0);

        // 11-bit signed offsets
        let x = ((word & 0x7FF) as i16) << 5 >> 5;
        let y = (((word >> 11) & 0x7FF) as i16) << 5 >> 5;

        self.draw_offset = (x, y);
        // flushes anything the renderer has buffered under the old offset
        self.renderer.set_draw_offset(x, y);
    }

    fn op_mask_bits(&mut self) {
        self.mask_bits = MaskBits::from_bits_truncate(self.fifo.word(0) as u8);
    }

    /// Handle a word written to the GP1 control port
    pub fn gp1(&mut self, word: u32) {
        let opcode = (word >> 24) as u8;

        match opcode {
            0x00 => self.reset(),
            0x01 => {
                self.fifo.clear();
                self.remaining_words = 0;
                self.current_op = None;
                self.transfer = None;
                self.mode = Gp0Mode::AwaitingCommand;
            }
            0x02 => self.interrupt = false,
            0x03 => self.display_disabled = word & 1 != 0,
            0x04 => {
                self.dma_direction = match word & 3 {
                    0 => DmaDirection::Off,
                    1 => DmaDirection::Fifo,
                    2 => DmaDirection::CpuToGp0,
                    _ => DmaDirection::VramToCpu,
                }
            }
            0x05 => {
                self.display_vram_start = ((word & 0x3FE) as u16, ((word >> 10) & 0x1FF) as u16);
            }
            0x06 => {
                self.display_horiz_range = ((word & 0xFFF) as u16, ((word >> 12) & 0xFFF) as u16);
            }
            0x07 => {
                self.display_line_range = ((word & 0x3FF) as u16, ((word >> 10) & 0x3FF) as u16);
            }
            0x08 => {
                self.hres1 = (word & 3) as u8;
                self.vres_high = word & 0x04 != 0;
                self.vmode = if word & 0x08 != 0 {
                    VMode::Pal
                } else {
                    VMode::Ntsc
                };
                self.display_depth = if word & 0x10 != 0 {
                    DisplayDepth::D24Bits
                } else {
                    DisplayDepth::D15Bits
                };
                self.interlaced = word & 0x20 != 0;
                self.hres2 = word & 0x40 != 0;

                if word & 0x80 != 0 {
                    log::warn!("GP1 display mode requested reverse output, not modelled");
                }
            }
            _ => log::warn!("unimplemented GP1 opcode 0x{:02X} (word 0x{:08X})", opcode, word),
        }
    }

    /// The GPUREAD port. Drains an active VRAM-to-CPU transfer two pixels
    /// per word, otherwise returns the read latch.
    pub fn read(&mut self) -> u32 {
        if self.mode != Gp0Mode::SendingPixels {
            return self.read_latch;
        }

        let rect = match self.transfer.as_mut() {
            Some(rect) => rect,
            None => return self.read_latch,
        };

        let mut word = 0u32;
        for shift in [0, 16] {
            if let Some((x, y)) = rect.next_pos() {
                word |= u32::from(self.vram.load16(x, y)) << shift;
            }
        }

        if rect.done() {
            self.transfer = None;
            self.mode = Gp0Mode::AwaitingCommand;
        }

        word
    }

    /// The packed status word
    pub fn status(&self) -> u32 {
        let mut status = 0u32;

        // bits 0-10 mirror the draw-mode register
        status |= u32::from(self.draw_mode.bits()) & 0x7FF;
        status |= u32::from(self.mask_bits.contains(MaskBits::FORCE_SET)) << 11;
        status |= u32::from(self.mask_bits.contains(MaskBits::CHECK)) << 12;
        // bit 13: interlace field, not modelled (always the top field)
        // bit 14: reverse flag, not modelled
        status |= u32::from(self.draw_mode.contains(DrawMode::TEXTURE_DISABLE)) << 15;
        status |= u32::from(self.hres2) << 16;
        status |= u32::from(self.hres1) << 17;
        status |= u32::from(self.vres_high) << 19;
        status |= (self.vmode as u32) << 20;
        status |= (self.display_depth as u32) << 21;
        status |= u32::from(self.interlaced) << 22;
        status |= u32::from(self.display_disabled) << 23;
        status |= u32::from(self.interrupt) << 24;

        // the three ready bits never deassert on this front-end
        status |= 1 << 26;
        status |= 1 << 27;
        status |= 1 << 28;

        status |= (self.dma_direction as u32) << 29;

        // bit 25 requests DMA service depending on the configured direction
        let dma_request = match self.dma_direction {
            DmaDirection::Off => 0,
            // FIFO state: report "not full"
            DmaDirection::Fifo => 1,
            DmaDirection::CpuToGp0 => (status >> 28) & 1,
            DmaDirection::VramToCpu => (status >> 27) & 1,
        };
        status |= dma_request << 25;

        status
    }

    /// Number of words currently staged in the command buffer
    pub fn fifo_len(&self) -> usize {
        self.fifo.len()
    }

    pub fn mode(&self) -> Gp0Mode {
        self.mode
    }

    pub fn draw_offset(&self) -> (i16, i16) {
        self.draw_offset
    }

    /// Drawing area as (left, top, right, bottom)
    pub fn draw_area(&self) -> (u16, u16, u16, u16) {
        (
            self.draw_area_left,
            self.draw_area_top,
            self.draw_area_right,
            self.draw_area_bottom,
        )
    }

    pub fn texture_window(&self) -> u32 {
        self.texture_window
    }

    /// First displayed pixel in VRAM
    pub fn display_origin(&self) -> (u16, u16) {
        self.display_vram_start
    }

    /// Horizontal display range in video-clock units
    pub fn display_horiz_range(&self) -> (u16, u16) {
        self.display_horiz_range
    }

    /// Displayed line range
    pub fn display_line_range(&self) -> (u16, u16) {
        self.display_line_range
    }

    pub fn last_fill(&self) -> Option<FillRect> {
        self.last_fill
    }

    pub fn vram(&self) -> &Vram {
        &self.vram
    }

    /// End-of-frame hook driven by the machine loop
    pub fn frame_done(&mut self) {
        self.renderer.display();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::gpu::renderer::NullRenderer;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Renderer handle that can be inspected after being moved into a Gpu
    #[derive(Clone, Default)]
    struct SharedRenderer(Rc<RefCell<NullRenderer>>);

    impl Renderer for SharedRenderer {
        fn push_triangle(&mut self, vertices: [Vertex; 3], colors: [Color; 3]) {
            self.0.borrow_mut().push_triangle(vertices, colors);
        }

        fn push_quad(&mut self, vertices: [Vertex; 4], colors: [Color; 4]) {
            self.0.borrow_mut().push_quad(vertices, colors);
        }

        fn push_textured_quad(
            &mut self,
            vertices: [Vertex; 4],
            color: Color,
            texcoords: [TexCoord; 4],
            clut: u16,
            page: u16,
        ) {
            self.0
                .borrow_mut()
                .push_textured_quad(vertices, color, texcoords, clut, page);
        }

        fn set_draw_offset(&mut self, x: i16, y: i16) {
            self.0.borrow_mut().set_draw_offset(x, y);
        }

        fn display(&mut self) {
            self.0.borrow_mut().display();
        }
    }

    fn gpu_with_renderer() -> (Gpu, SharedRenderer) {
        let renderer = SharedRenderer::default();
        (Gpu::new(Box::new(renderer.clone())), renderer)
    }

    #[test]
    fn every_opcode_drains_the_fifo() {
        let (mut gpu, _renderer) = gpu_with_renderer();

        for opcode in [
            0x00u8, 0x01, 0x02, 0x28, 0x2C, 0x30, 0x38, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6,
        ] {
            let op = Gp0Op::decode(opcode).unwrap();
            gpu.gp0(u32::from(opcode) << 24);
            for _ in 1..op.length() {
                gpu.gp0(0x0001_0001);
            }
            assert_eq!(gpu.fifo_len(), 0, "opcode 0x{:02X} left words staged", opcode);
            assert_eq!(
                gpu.mode(),
                Gp0Mode::AwaitingCommand,
                "opcode 0x{:02X} left the port in transfer mode",
                opcode
            );
        }
    }

    #[test]
    fn image_load_enters_pixel_mode() {
        let (mut gpu, _renderer) = gpu_with_renderer();

        gpu.gp0(0xA000_0000);
        gpu.gp0(0x0000_0000);
        gpu.gp0(0x0002_0002); // 2x2 pixels, two words

        assert_eq!(gpu.mode(), Gp0Mode::ReceivingPixels);

        gpu.gp0(0x2222_1111);
        assert_eq!(gpu.mode(), Gp0Mode::ReceivingPixels);
        gpu.gp0(0x4444_3333);
        assert_eq!(gpu.mode(), Gp0Mode::AwaitingCommand);

        assert_eq!(gpu.vram().load16(0, 0), 0x1111);
        assert_eq!(gpu.vram().load16(1, 0), 0x2222);
        assert_eq!(gpu.vram().load16(0, 1), 0x3333);
        assert_eq!(gpu.vram().load16(1, 1), 0x4444);
    }

    #[test]
    fn image_store_round_trips_through_gpuread() {
        let (mut gpu, _renderer) = gpu_with_renderer();

        // upload a 2x1 rectangle...
        gpu.gp0(0xA000_0000);
        gpu.gp0(0x0000_0000);
        gpu.gp0(0x0001_0002);
        gpu.gp0(0xBEEF_CAFE);

        // ...and read it back
        gpu.gp0(0xC000_0000);
        gpu.gp0(0x0000_0000);
        gpu.gp0(0x0001_0002);

        assert_eq!(gpu.mode(), Gp0Mode::SendingPixels);
        assert_eq!(gpu.read(), 0xBEEF_CAFE);
        assert_eq!(gpu.mode(), Gp0Mode::AwaitingCommand);
    }

    #[test]
    fn primitives_reach_the_renderer() {
        let (mut gpu, renderer) = gpu_with_renderer();

        // monochrome quad
        gpu.gp0(0x2800_FF00);
        for _ in 0..4 {
            gpu.gp0(0x0001_0001);
        }

        // shaded triangle
        gpu.gp0(0x3000_0080);
        for _ in 0..5 {
            gpu.gp0(0x0002_0002);
        }

        // textured quad
        gpu.gp0(0x2C80_8080);
        for _ in 0..8 {
            gpu.gp0(0x0003_0003);
        }

        let stats = renderer.0.borrow();
        assert_eq!(stats.quads, 1);
        assert_eq!(stats.triangles, 1);
        assert_eq!(stats.textured_quads, 1);
    }

    #[test]
    fn draw_offset_is_sign_extended_and_flushed() {
        let (mut gpu, renderer) = gpu_with_renderer();

        // x = -1 (0x7FF), y = 4
        gpu.gp0(0xE500_0000 | 0x7FF | (4 << 11));

        assert_eq!(gpu.draw_offset(), (-1, 4));
        assert_eq!(renderer.0.borrow().draw_offset, (-1, 4));
    }

    #[test]
    fn status_reflects_draw_mode() {
        let (mut gpu, _renderer) = gpu_with_renderer();

        // texture page (5, 1), dithering on
        gpu.gp0(0xE100_0000 | 5 | (1 << 4) | (1 << 9));

        let status = gpu.status();
        assert_eq!(status & 0xF, 5);
        assert_ne!(status & (1 << 4), 0);
        assert_ne!(status & (1 << 9), 0);
        // ready bits always set
        assert_eq!(status & (7 << 26), 7 << 26);
    }

    #[test]
    fn reset_matches_power_on_status() {
        let (mut gpu, _renderer) = gpu_with_renderer();
        let (fresh, _renderer2) = gpu_with_renderer();

        gpu.gp0(0xE100_0000 | 0x3FF);
        gpu.gp1(0x0400_0002);
        gpu.gp1(0x0300_0000);

        gpu.gp1(0x0000_0000);

        assert_eq!(gpu.status(), fresh.status());
    }

    #[test]
    fn drawing_window_registers_latch() {
        let (mut gpu, _renderer) = gpu_with_renderer();

        gpu.gp0(0xE300_0000 | 16 | (32 << 10));
        gpu.gp0(0xE400_0000 | 255 | (200 << 10));
        gpu.gp0(0xE200_0000 | 0x5_1234);

        assert_eq!(gpu.draw_area(), (16, 32, 255, 200));
        assert_eq!(gpu.texture_window(), 0x5_1234);
    }

    #[test]
    fn display_registers_latch() {
        let (mut gpu, _renderer) = gpu_with_renderer();

        gpu.gp1(0x0500_0000 | 64 | (32 << 10));
        gpu.gp1(0x0600_0000 | 0x200 | (0xC00 << 12));
        gpu.gp1(0x0700_0000 | 0x10 | (0x100 << 10));

        assert_eq!(gpu.display_origin(), (64, 32));
        assert_eq!(gpu.display_horiz_range(), (0x200, 0xC00));
        assert_eq!(gpu.display_line_range(), (0x10, 0x100));
    }

    #[test]
    fn fill_rect_is_recorded() {
        let (mut gpu, _renderer) = gpu_with_renderer();

        gpu.gp0(0x0200_00FF);
        gpu.gp0(0x0010_0020);
        gpu.gp0(0x0008_0004);

        let fill = gpu.last_fill().expect("fill must be latched");
        assert_eq!(fill.x, 0x20);
        assert_eq!(fill.y, 0x10);
        assert_eq!(fill.width, 4);
        assert_eq!(fill.height, 8);
        assert_eq!(fill.color.r, 0xFF);
    }
}
