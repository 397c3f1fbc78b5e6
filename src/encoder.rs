//! Wire encoding for the matrix's column protocol.
//!
//! Every command starts with the magic prefix `0x32 0xAC`, then a command byte:
//! - `0x07` stage column: one column id byte followed by 34 brightness bytes
//! - `0x08` flush: no payload; the device presents all staged columns at once
//!
//! A frame is always nine stage commands in column order followed by one
//! flush, so the panel never shows a half-updated picture.

use crate::{Grid, HEIGHT, MAX_BRIGHT};

pub const MAGIC: [u8; 2] = [0x32, 0xAC];
pub const CMD_STAGE_COLUMN: u8 = 0x07;
pub const CMD_FLUSH: u8 = 0x08;

/// Bytes in one stage-column command.
pub const STAGE_LEN: usize = MAGIC.len() + 2 + HEIGHT;
/// Bytes in the flush command.
pub const FLUSH_LEN: usize = MAGIC.len() + 1;

/// Build a stage-column command.
///
/// Values outside `0..=255` are clamped and reported; they never abort the frame.
pub fn encode_column(column_id: u8, values: &[i32; HEIGHT]) -> Vec<u8> {
    let mut cmd = Vec::with_capacity(STAGE_LEN);
    cmd.extend_from_slice(&MAGIC);
    cmd.push(CMD_STAGE_COLUMN);
    cmd.push(column_id);

    for (row, &value) in values.iter().enumerate() {
        let clamped = value.clamp(0, MAX_BRIGHT as i32);
        if clamped != value {
            tracing::warn!(
                "Brightness {} out of range (0-255) at column {} row {}, clamped to {}",
                value,
                column_id,
                row,
                clamped
            );
        }
        cmd.push(clamped as u8);
    }
    cmd
}

pub fn encode_flush() -> Vec<u8> {
    let mut cmd = Vec::with_capacity(FLUSH_LEN);
    cmd.extend_from_slice(&MAGIC);
    cmd.push(CMD_FLUSH);
    cmd
}

/// The per-tick command sequence: columns 0..WIDTH in order, then flush.
///
/// Each element is one device command, written to the transport on its own.
pub fn frame_commands(grid: &Grid) -> Vec<Vec<u8>> {
    let mut commands: Vec<Vec<u8>> = grid
        .columns()
        .enumerate()
        .map(|(id, column)| encode_column(id as u8, &(*column).map(i32::from)))
        .collect();
    commands.push(encode_flush());
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WIDTH;
    use crate::animator::Pulse;
    use crate::frame::render;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(4)]
    #[case(8)]
    fn stage_column_header(#[case] id: u8) {
        let cmd = encode_column(id, &[17; HEIGHT]);
        assert_eq!(cmd.len(), STAGE_LEN);
        assert_eq!(&cmd[..4], &[0x32, 0xAC, 0x07, id]);
        assert!(cmd[4..].iter().all(|&v| v == 17));
    }

    #[test]
    fn stage_column_clamps_out_of_range_values() {
        let mut values = [0; HEIGHT];
        values[0] = 300;
        values[1] = -5;
        values[2] = 10;
        values[HEIGHT - 1] = 255;

        let cmd = encode_column(3, &values);

        assert_eq!(cmd.len(), 4 + HEIGHT);
        assert_eq!(&cmd[..4], &[0x32, 0xAC, 0x07, 3]);
        assert_eq!(&cmd[4..7], &[255, 0, 10]);
        assert_eq!(cmd[4 + HEIGHT - 1], 255);
    }

    #[test]
    fn flush_is_three_bytes() {
        assert_eq!(encode_flush(), vec![0x32, 0xAC, 0x08]);
        assert_eq!(FLUSH_LEN, 3);
    }

    #[test]
    fn frame_is_nine_ordered_stages_then_flush() {
        let grid = render(45.0, &Pulse::default());
        let commands = frame_commands(&grid);

        assert_eq!(commands.len(), WIDTH + 1);
        for (id, cmd) in commands[..WIDTH].iter().enumerate() {
            assert_eq!(cmd.len(), 38);
            assert_eq!(&cmd[..4], &[0x32, 0xAC, 0x07, id as u8]);
            assert_eq!(&cmd[4..], grid.column(id).as_slice());
        }
        assert_eq!(commands[WIDTH], encode_flush());
    }

    #[test]
    fn frame_stream_concatenates_without_interleaving() {
        let grid = render(80.0, &Pulse::default());
        let bytes = frame_commands(&grid).concat();

        assert_eq!(bytes.len(), 9 * 38 + 3);
        for (id, chunk) in bytes[..WIDTH * STAGE_LEN].chunks(STAGE_LEN).enumerate() {
            assert_eq!(chunk[2], CMD_STAGE_COLUMN);
            assert_eq!(chunk[3], id as u8);
        }
        assert_eq!(&bytes[WIDTH * STAGE_LEN..], &[0x32, 0xAC, 0x08]);
    }
}
