/// The `k` most probable classes of a logit vector as `(class, probability)`
/// pairs, most probable first. Probabilities are the softmax over all logits.
pub fn top_k_classes(logits: &[f32], k: usize) -> Vec<(usize, f32)> {
    if logits.is_empty() || k == 0 {
        return Vec::new();
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();

    let mut ranked: Vec<(usize, f32)> = exps.into_iter().map(|e| e / total).enumerate().collect();
    // Sort descending by probability; ties keep class order.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_top_k_orders_and_normalizes() {
        let top = top_k_classes(&[1.0, 3.0, 2.0, 0.0], 2);
        assert_eq!(top.iter().map(|(c, _)| *c).collect::<Vec<_>>(), vec![1, 2]);
        let all: f32 = top_k_classes(&[1.0, 3.0, 2.0, 0.0], 10).iter().map(|(_, p)| p).sum();
        assert_relative_eq!(all, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_top_k_large_logits_are_stable() {
        let top = top_k_classes(&[1000.0, 1000.0], 1);
        assert_eq!(top[0].0, 0);
        assert_relative_eq!(top[0].1, 0.5);
    }

    #[test]
    fn test_top_k_empty() {
        assert!(top_k_classes(&[], 3).is_empty());
        assert!(top_k_classes(&[1.0], 0).is_empty());
    }
}
