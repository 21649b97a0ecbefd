//! Host-side vertex data for the demo models.

use crate::{GPUError, Result, Vertex};

/// Deepest subdivision accepted: `3 * 3^10` vertices, about 3.5 MB.
pub const MAX_SIERPINSKI_LEVEL: u32 = 10;

const BASE: [Vertex; 3] = [
    Vertex::new([0.0, -0.5], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 1.0, 0.0]),
    Vertex::new([-0.5, 0.5], [0.0, 0.0, 1.0]),
];

fn midpoint(a: &Vertex, b: &Vertex) -> Vertex {
    let mut out = Vertex::default();
    for i in 0..2 {
        out.position[i] = (a.position[i] + b.position[i]) / 2.0;
    }
    for i in 0..3 {
        out.color[i] = (a.color[i] + b.color[i]) / 2.0;
    }
    out
}

/// Number of vertices produced by `level` subdivisions, if it fits a `usize`.
pub fn sierpinski_vertex_count(level: u32) -> Option<usize> {
    3usize.checked_pow(level)?.checked_mul(3)
}

/// Subdivides the triangle `a, b, c` `level` times, keeping the three corner
/// triangles at every step. Returns `3 * 3^level` vertices in draw order.
///
/// Fails with [`GPUError::ConfigError`] above [`MAX_SIERPINSKI_LEVEL`].
pub fn sierpinski(level: u32, a: Vertex, b: Vertex, c: Vertex) -> Result<Vec<Vertex>> {
    let count = sierpinski_vertex_count(level)
        .filter(|_| level <= MAX_SIERPINSKI_LEVEL)
        .ok_or_else(|| {
            GPUError::ConfigError(format!(
                "sierpinski level {} exceeds the maximum of {}",
                level, MAX_SIERPINSKI_LEVEL
            ))
        })?;
    let mut out = Vec::with_capacity(count);
    subdivide(level, a, b, c, &mut out);
    Ok(out)
}

fn subdivide(level: u32, a: Vertex, b: Vertex, c: Vertex, out: &mut Vec<Vertex>) {
    if level == 0 {
        out.extend_from_slice(&[a, b, c]);
        return;
    }

    let ab = midpoint(&a, &b);
    let bc = midpoint(&b, &c);
    let ca = midpoint(&c, &a);

    subdivide(level - 1, a, ab, ca, out);
    subdivide(level - 1, ab, b, bc, out);
    subdivide(level - 1, ca, bc, c, out);
}

/// Sierpinski triangle over the red/green/blue base triangle.
pub fn sierpinski_vertices(level: u32) -> Result<Vec<Vertex>> {
    let [a, b, c] = BASE;
    sierpinski(level, a, b, c)
}

/// The single triangle drawn by default.
pub fn triangle() -> Vec<Vertex> {
    BASE.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_is_the_input() {
        assert_eq!(sierpinski_vertices(0).unwrap(), triangle());
    }

    #[test]
    fn each_level_triples() {
        assert_eq!(sierpinski_vertices(1).unwrap().len(), 9);
        assert_eq!(sierpinski_vertices(4).unwrap().len(), 243);
        assert_eq!(
            sierpinski_vertices(MAX_SIERPINSKI_LEVEL).unwrap().len(),
            sierpinski_vertex_count(MAX_SIERPINSKI_LEVEL).unwrap()
        );
    }

    #[test]
    fn deep_levels_are_rejected() {
        let err = sierpinski_vertices(MAX_SIERPINSKI_LEVEL + 1).unwrap_err();
        assert!(matches!(err, GPUError::ConfigError(_)));
        assert!(sierpinski_vertices(41).is_err());
        assert!(sierpinski_vertices(u32::MAX).is_err());
        assert_eq!(sierpinski_vertex_count(u32::MAX), None);
    }

    #[test]
    fn midpoints_blend_position_and_color() {
        let v = sierpinski_vertices(1).unwrap();
        // Second vertex of the first sub-triangle is the a/b midpoint.
        assert_eq!(v[1].position, [0.25, 0.0]);
        assert_eq!(v[1].color, [0.5, 0.5, 0.0]);
        // Corners survive untouched.
        assert_eq!(v[0], BASE[0]);
        assert_eq!(v[4], BASE[1]);
        assert_eq!(v[8], BASE[2]);
    }
}
