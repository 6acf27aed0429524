/// Render a base-unit amount with the given number of decimal places.
pub fn format_token_amount(amount: u64, decimals: u32) -> String {
	format!(
		"{:.*}",
		decimals as usize,
		amount as f64 / 10f64.powi(decimals as i32)
	)
}

/// Compose the output id the node APIs use: the creating transaction id
/// followed by the output index as two little-endian hex bytes.
pub fn output_id_hex(transaction_id: &str, output_index: u16) -> String {
	let bytes = output_index.to_le_bytes();
	format!("{}{:02x}{:02x}", transaction_id, bytes[0], bytes[1])
}
