use crate::backend::PoolKind;
use crate::error::Result;
use crate::geometry::WindowGeometry;

use super::check_len;

pub fn pool(kind: PoolKind, input: &[f32], g: &WindowGeometry, out: &mut [f32]) -> Result<()> {
    check_len("pool", "input", input.len(), g.in_h * g.in_w * g.in_c)?;
    check_len("pool", "out", out.len(), g.out_h * g.out_w * g.out_c)?;

    let c = g.in_c;
    for oy in 0..g.out_h {
        for ox in 0..g.out_w {
            let acc = &mut out[(oy * g.out_w + ox) * c..][..c];
            acc.fill(match kind {
                PoolKind::Max => f32::NEG_INFINITY,
                PoolKind::Avg => 0.0,
            });

            let mut count = 0usize;
            for ky in 0..g.k_h {
                let Some(iy) = g.source_row(oy, ky) else {
                    continue;
                };
                for kx in 0..g.k_w {
                    let Some(ix) = g.source_col(ox, kx) else {
                        continue;
                    };
                    count += 1;
                    let pixel = &input[(iy * g.in_w + ix) * c..][..c];
                    for (a, &v) in acc.iter_mut().zip(pixel) {
                        match kind {
                            PoolKind::Max => *a = a.max(v),
                            PoolKind::Avg => *a += v,
                        }
                    }
                }
            }

            if count == 0 {
                // Window fell entirely into padding.
                acc.fill(0.0);
            } else if kind == PoolKind::Avg {
                let inv = 1.0 / count as f32;
                acc.iter_mut().for_each(|a| *a *= inv);
            }
        }
    }
    Ok(())
}
