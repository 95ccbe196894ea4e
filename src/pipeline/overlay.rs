use crate::types::Hand;

pub const NUM_LANDMARKS: usize = 21;

const LINE_THICKNESS: i32 = 3;
const POINT_RADIUS: i32 = 3;
const POINT_COLOR: [u8; 4] = [248, 113, 113, 255];

/// One anatomical segment group of the 21-point hand model, drawn in its
/// own fixed color. Indices follow the standard hand-landmark numbering:
/// 0 wrist, 1-4 thumb, 5-8 index, 9-12 middle, 13-16 ring, 17-20 pinky.
pub struct ConnectionGroup {
    pub color: [u8; 4],
    pub segments: &'static [(usize, usize)],
}

pub const CONNECTION_GROUPS: &[ConnectionGroup] = &[
    // thumb
    ConnectionGroup {
        color: [251, 191, 36, 255],
        segments: &[(1, 2), (2, 3), (3, 4)],
    },
    // index
    ConnectionGroup {
        color: [56, 189, 248, 255],
        segments: &[(5, 6), (6, 7), (7, 8)],
    },
    // middle
    ConnectionGroup {
        color: [52, 211, 153, 255],
        segments: &[(9, 10), (10, 11), (11, 12)],
    },
    // ring
    ConnectionGroup {
        color: [167, 139, 250, 255],
        segments: &[(13, 14), (14, 15), (15, 16)],
    },
    // pinky
    ConnectionGroup {
        color: [251, 113, 133, 255],
        segments: &[(17, 18), (18, 19), (19, 20)],
    },
    // palm web
    ConnectionGroup {
        color: [226, 232, 240, 255],
        segments: &[(0, 1), (0, 5), (5, 9), (9, 13), (13, 17), (0, 17)],
    },
];

/// Draws every hand into the RGBA buffer, in the order the model returned
/// them: all connection groups first, then a filled circle per landmark.
/// Points are normalized [0, 1]; no smoothing is applied across frames.
pub fn draw_hands(buffer: &mut [u8], width: u32, height: u32, hands: &[Hand]) {
    for hand in hands {
        draw_hand(buffer, width, height, hand);
    }
}

fn draw_hand(buffer: &mut [u8], width: u32, height: u32, hand: &Hand) {
    let to_pixel = |(x, y, _z): (f32, f32, f32)| (x * width as f32, y * height as f32);

    for group in CONNECTION_GROUPS {
        for &(a, b) in group.segments {
            if let (Some(&pa), Some(&pb)) = (hand.points.get(a), hand.points.get(b)) {
                draw_line(
                    buffer,
                    width,
                    height,
                    to_pixel(pa),
                    to_pixel(pb),
                    group.color,
                    LINE_THICKNESS,
                );
            }
        }
    }

    for &point in &hand.points {
        let (x, y) = to_pixel(point);
        draw_circle(
            buffer,
            width,
            height,
            (x as i32, y as i32),
            POINT_RADIUS,
            POINT_COLOR,
        );
    }
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (f32, f32),
    p1: (f32, f32),
    color: [u8; 4],
    thickness: i32,
) {
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        put_pixel_safe(buffer, width, height, x0, y0, color);
        if radius > 0 {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if ox == 0 && oy == 0 {
                        continue;
                    }
                    if ox.abs() + oy.abs() <= radius {
                        put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
                    }
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 4],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Handedness;

    #[test]
    fn topology_stays_inside_the_hand_model() {
        for group in CONNECTION_GROUPS {
            for &(a, b) in group.segments {
                assert!(a < NUM_LANDMARKS);
                assert!(b < NUM_LANDMARKS);
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn five_fingers_plus_palm_with_distinct_colors() {
        assert_eq!(CONNECTION_GROUPS.len(), 6);
        for (i, a) in CONNECTION_GROUPS.iter().enumerate() {
            for b in &CONNECTION_GROUPS[i + 1..] {
                assert_ne!(a.color, b.color);
            }
        }
    }

    #[test]
    fn every_landmark_is_connected() {
        let mut touched = [false; NUM_LANDMARKS];
        for group in CONNECTION_GROUPS {
            for &(a, b) in group.segments {
                touched[a] = true;
                touched[b] = true;
            }
        }
        assert!(touched.iter().all(|&t| t));
    }

    #[test]
    fn drawing_marks_pixels_and_stays_in_bounds() {
        let (width, height) = (32u32, 32u32);
        let mut buffer = vec![0u8; (width * height * 4) as usize];
        let hand = Hand {
            points: (0..NUM_LANDMARKS)
                .map(|i| (i as f32 / NUM_LANDMARKS as f32, 0.5, 0.0))
                .collect(),
            handedness: Handedness::Right,
            score: 0.9,
        };
        draw_hands(&mut buffer, width, height, &[hand]);
        assert!(buffer.iter().any(|&b| b != 0));
    }
}
