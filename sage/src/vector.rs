//! Embedding storage codec and similarity scan.
//!
//! Embeddings are stored as little-endian f32 blobs in SQLite and compared
//! with cosine similarity. The scan is a brute-force pass over the most
//! recent vectors; at personal-history scale this stays comfortably inside
//! the query latency budget.

/// Encode an embedding as a little-endian f32 byte blob.
pub fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode an embedding blob. A trailing partial chunk (corrupt blob) is
/// ignored rather than rejected.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity between two vectors.
/// Returns 0.0 for mismatched dimensionality or zero-magnitude input, so
/// vectors from different capability versions coexist without scoring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Score `candidates` against `query` and keep the `limit` best, descending.
/// Non-positive similarities (orthogonal, zero, or mismatched-dimension
/// vectors) are dropped from the candidate set.
pub fn top_k(
    query: &[f32],
    candidates: impl IntoIterator<Item = (String, Vec<f32>)>,
    limit: usize,
) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = candidates
        .into_iter()
        .filter_map(|(id, vector)| {
            let score = cosine_similarity(query, &vector);
            (score > 0.0).then_some((id, score))
        })
        .collect();

    scored.sort_unstable_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}
