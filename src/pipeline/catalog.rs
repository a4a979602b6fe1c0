//! New-subject cataloguing: which markers get their picture taken, and where

use std::collections::HashSet;
use std::time::Duration;

use image::GrayImage;

use super::message::MarkerReadout;
use crate::capture::Frame;
use crate::error::ExportError;

/// Rolling window during which each marker id is exported at most once.
///
/// The first observed time opens the window; once a frame reaches the
/// boundary the exported set is cleared and the boundary moves forward by
/// whole renewal periods.
#[derive(Debug)]
pub struct CatalogWindow {
    period: Duration,
    boundary: Option<Duration>,
    exported: HashSet<u32>,
}

/// Marker selected for export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: u32,
    pub x: f64,
    pub y: f64,
}

impl CatalogWindow {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            boundary: None,
            exported: HashSet::new(),
        }
    }

    /// Move the window to `now`. Returns true when the exported set was cleared.
    pub fn advance(&mut self, now: Duration) -> bool {
        match self.boundary {
            Some(boundary) if now < boundary => false,
            Some(boundary) => {
                let period = self.period.as_nanos().max(1);
                let periods = (now - boundary).as_nanos() / period + 1;
                let step = Duration::from_nanos((period * periods).min(u64::MAX as u128) as u64);
                self.boundary = Some(boundary + step);
                self.exported.clear();
                true
            }
            None => {
                self.boundary = Some(now + self.period);
                self.exported.clear();
                true
            }
        }
    }

    /// Up to `limit` markers not yet exported in this window.
    pub fn select_unexported(&self, markers: &[MarkerReadout], limit: usize) -> Vec<Candidate> {
        let mut selected: Vec<Candidate> = Vec::with_capacity(limit.min(markers.len()));
        for marker in markers {
            if selected.len() >= limit {
                break;
            }
            if self.exported.contains(&marker.id) || selected.iter().any(|c| c.id == marker.id) {
                continue;
            }
            selected.push(Candidate {
                id: marker.id,
                x: marker.x,
                y: marker.y,
            });
        }
        selected
    }

    pub fn mark_exported(&mut self, id: u32) {
        self.exported.insert(id);
    }

    pub fn is_exported(&self, id: u32) -> bool {
        self.exported.contains(&id)
    }

    pub fn boundary(&self) -> Option<Duration> {
        self.boundary
    }
}

/// Square window of a frame, fully inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl RegionOfInterest {
    /// Window of `size` centred on (`cx`, `cy`), with its top-left corner
    /// clamped to `[0, dimension - size]` on both axes.
    pub fn centered(cx: f64, cy: f64, size: u32, width: u32, height: u32) -> Self {
        let half = i64::from(size / 2);
        let clamp = |centre: f64, dimension: u32| -> u32 {
            let max = i64::from(dimension.saturating_sub(size));
            ((centre as i64) - half).clamp(0, max) as u32
        };
        Self {
            x: clamp(cx, width),
            y: clamp(cy, height),
            size,
        }
    }

    /// Bottom-right corner, exclusive.
    pub fn end(&self) -> (u32, u32) {
        (self.x + self.size, self.y + self.size)
    }

    /// Copy the window out of `frame`.
    pub fn crop(&self, frame: &Frame) -> Result<GrayImage, ExportError> {
        let (end_x, end_y) = self.end();
        if end_x > frame.width() || end_y > frame.height() {
            return Err(ExportError::InvalidRegion {
                x: self.x,
                y: self.y,
                size: self.size,
                width: frame.width(),
                height: frame.height(),
            });
        }

        let size = self.size as usize;
        let mut pixels = Vec::with_capacity(size * size);
        for y in self.y..end_y {
            pixels.extend_from_slice(&frame.row(y)[self.x as usize..end_x as usize]);
        }
        GrayImage::from_raw(self.size, self.size, pixels).ok_or(ExportError::InvalidRegion {
            x: self.x,
            y: self.y,
            size: self.size,
            width: frame.width(),
            height: frame.height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameMetadata;
    use bytes::Bytes;
    use std::time::SystemTime;

    const P: Duration = Duration::from_secs(60);

    fn marker(id: u32) -> MarkerReadout {
        MarkerReadout::at(id, 10.0, 10.0)
    }

    #[test]
    fn marker_is_exported_once_per_window() {
        let t = Duration::from_secs(1000);
        let mut window = CatalogWindow::new(P);
        assert!(window.advance(t));

        let eps = Duration::from_millis(5);
        window.advance(t + eps);
        assert_eq!(window.select_unexported(&[marker(7)], 4).len(), 1);
        window.mark_exported(7);

        assert!(!window.advance(t + P - Duration::from_micros(1)));
        assert!(window.select_unexported(&[marker(7)], 4).is_empty());

        assert!(window.advance(t + P));
        assert_eq!(window.select_unexported(&[marker(7)], 4).len(), 1);
    }

    #[test]
    fn boundary_moves_in_whole_periods_after_a_gap() {
        let mut window = CatalogWindow::new(P);
        window.advance(Duration::ZERO);
        window.advance(P * 3 + Duration::from_secs(10));
        assert_eq!(window.boundary(), Some(P * 4));
    }

    #[test]
    fn selection_is_bounded_and_skips_duplicates() {
        let mut window = CatalogWindow::new(P);
        window.advance(Duration::ZERO);
        window.mark_exported(1);

        let markers = [marker(1), marker(2), marker(2), marker(3), marker(4)];
        let ids: Vec<u32> = window
            .select_unexported(&markers, 2)
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn roi_at_origin_is_not_negative() {
        let roi = RegionOfInterest::centered(0.0, 0.0, 100, 1000, 1000);
        assert_eq!((roi.x, roi.y), (0, 0));
        assert_eq!(roi.end(), (100, 100));
    }

    #[test]
    fn roi_is_clamped_at_the_far_edge() {
        let roi = RegionOfInterest::centered(995.5, 420.0, 100, 1000, 800);
        assert_eq!((roi.x, roi.y), (900, 370));
    }

    #[test]
    fn crop_copies_the_window() {
        let pixels: Vec<u8> = (0..16).collect();
        let frame = Frame::new(
            Bytes::from(pixels),
            FrameMetadata {
                id: 0,
                device_timestamp: Duration::ZERO,
                time: SystemTime::now(),
                width: 4,
                height: 4,
            },
        );
        let roi = RegionOfInterest::centered(3.0, 3.0, 2, 4, 4);
        let image = roi.crop(&frame).unwrap();
        assert_eq!(image.as_raw(), &vec![10, 11, 14, 15]);

        let oversized = RegionOfInterest { x: 3, y: 0, size: 2 };
        assert!(matches!(
            oversized.crop(&frame),
            Err(ExportError::InvalidRegion { .. })
        ));
    }
}
