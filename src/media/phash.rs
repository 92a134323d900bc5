//! 64-bit perceptual hashes for decodable images.

use std::collections::BTreeMap;
use std::path::Path;
use image::imageops::FilterType;
use image::DynamicImage;
use crate::error::Result;

/// `ahash`, `dhash`, and `phash` (same bits as `dhash`) as 16-digit hex strings.
pub fn compute_hashes(path: &Path) -> Result<BTreeMap<String, String>> {
    let image = image::open(path)?;
    Ok(hashes_for(&image))
}

pub fn hashes_for(image: &DynamicImage) -> BTreeMap<String, String> {
    let ahash = to_hex(average_hash(image));
    let dhash = to_hex(difference_hash(image));

    let mut hashes = BTreeMap::new();
    hashes.insert("ahash".to_string(), ahash);
    hashes.insert("phash".to_string(), dhash.clone());
    hashes.insert("dhash".to_string(), dhash);
    hashes
}

/// One bit per cell of an 8x8 grayscale thumbnail: set when brighter than the mean.
pub fn average_hash(image: &DynamicImage) -> u64 {
    let small = image.resize_exact(8, 8, FilterType::Triangle).to_luma8();
    let pixels: Vec<u32> = small.pixels().map(|p| p[0] as u32).collect();
    let mean = pixels.iter().sum::<u32>() / pixels.len() as u32;

    pixels
        .iter()
        .fold(0u64, |acc, &p| (acc << 1) | u64::from(p > mean))
}

/// One bit per horizontal neighbour pair of a 9x8 grayscale thumbnail.
pub fn difference_hash(image: &DynamicImage) -> u64 {
    let small = image.resize_exact(9, 8, FilterType::Triangle).to_luma8();
    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = small.get_pixel(x, y)[0];
            let right = small.get_pixel(x + 1, y)[0];
            hash = (hash << 1) | u64::from(left > right);
        }
    }
    hash
}

fn to_hex(hash: u64) -> String {
    format!("{:016x}", hash)
}
