pub const LANG_ID: &str = "recvc-func@0.1.0";

/// Protocol-level constants shared by the router, the identifier resolver and the simulator.
pub mod protocol {
    /// Width of the message opcode field at the head of every binary payload.
    pub const OPCODE_BITS: usize = 32;
    /// Width of the `0xFFFFFFFF` marker prepended to bounced message bodies.
    pub const BOUNCE_MARKER_BITS: usize = 32;
    /// Bits of the original body carried by a bounced message (opcode included).
    pub const BOUNCED_BODY_BITS: usize = 256;
    /// Bits available to message fields in a bounced body, after the opcode.
    pub const BOUNCED_FIELD_BITS: usize = BOUNCED_BODY_BITS - OPCODE_BITS;
    /// Largest comment (in UTF-8 bytes) that still fits one cell next to the zero opcode.
    pub const MAX_COMMENT_BYTES: usize = 123;
    pub const MAX_CELL_BITS: usize = 1023;
    pub const MAX_CELL_REFS: usize = 4;
}

pub mod limits {
    pub const MAX_INPUT_BYTES: usize = 4 * 1024 * 1024;
    pub const MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;
    pub const MAX_BODY_DEPTH: usize = 64;

    pub fn max_input_bytes() -> usize {
        match std::env::var("RECVC_MAX_INPUT_BYTES") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_INPUT_BYTES),
            Err(_) => MAX_INPUT_BYTES,
        }
    }

    pub fn max_output_bytes() -> usize {
        match std::env::var("RECVC_MAX_OUTPUT_BYTES") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_OUTPUT_BYTES),
            Err(_) => MAX_OUTPUT_BYTES,
        }
    }
}
