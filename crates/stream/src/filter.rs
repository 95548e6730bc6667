// Pluggable byte transform applied ahead of the parser

/// Transform applied to each raw chunk before it reaches the parser
/// (decryption, de-obfuscation). `filter` mutates in place; `reset` clears
/// any rolling state so the filter stays correct across a seek/reconnect
/// discontinuity.
pub trait DataFilter: Send {
    fn filter(&mut self, data: &mut [u8]);

    fn reset(&mut self);
}
