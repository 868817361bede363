//! 仿射变换工具模块
//! 相机帧坐标 ⇄ 检测器输入裁剪图坐标的双向映射
use fast_image_resize as fr;
use image::{Rgba, RgbaImage};

use crate::detection::types::BBox;
use crate::error::GeometryError;

/// 行列式低于此值视为奇异矩阵
const SINGULAR_EPSILON: f64 = 1e-12;

/// 仿射变换矩阵 (2x3)
/// | a11 a12 b1 |
/// | a21 a22 b2 |
///
/// 内部使用 f64,保证正反变换往返误差远小于一个像素
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub a11: f64,
    pub a12: f64,
    pub b1: f64,
    pub a21: f64,
    pub a22: f64,
    pub b2: f64,
}

impl AffineMatrix {
    /// 创建单位仿射矩阵
    pub fn identity() -> Self {
        Self {
            a11: 1.0,
            a12: 0.0,
            b1: 0.0,
            a21: 0.0,
            a22: 1.0,
            b2: 0.0,
        }
    }

    /// 创建平移矩阵
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            b1: dx,
            b2: dy,
            ..Self::identity()
        }
    }

    /// 创建缩放矩阵
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a11: sx,
            a22: sy,
            ..Self::identity()
        }
    }

    /// 创建旋转矩阵 (角度制, 图像坐标系下顺时针)
    pub fn rotation(angle_degrees: f64) -> Self {
        let angle_rad = angle_degrees.to_radians();
        let cos_a = angle_rad.cos();
        let sin_a = angle_rad.sin();
        Self {
            a11: cos_a,
            a12: -sin_a,
            b1: 0.0,
            a21: sin_a,
            a22: cos_a,
            b2: 0.0,
        }
    }

    /// 矩阵组合 (self * other): 先应用 other,再应用 self
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            a11: self.a11 * other.a11 + self.a12 * other.a21,
            a12: self.a11 * other.a12 + self.a12 * other.a22,
            b1: self.a11 * other.b1 + self.a12 * other.b2 + self.b1,
            a21: self.a21 * other.a11 + self.a22 * other.a21,
            a22: self.a21 * other.a12 + self.a22 * other.a22,
            b2: self.a21 * other.b1 + self.a22 * other.b2 + self.b2,
        }
    }

    /// 在当前变换之后追加一个变换 (post-concatenation)
    fn then(self, next: Self) -> Self {
        next.compose(&self)
    }

    pub fn determinant(&self) -> f64 {
        self.a11 * self.a22 - self.a12 * self.a21
    }

    /// 计算逆矩阵 (用于反向映射)
    pub fn inverse(&self) -> Result<Self, GeometryError> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
            return Err(GeometryError::Singular { determinant: det });
        }

        let inv_det = 1.0 / det;
        Ok(Self {
            a11: self.a22 * inv_det,
            a12: -self.a12 * inv_det,
            b1: (self.a12 * self.b2 - self.a22 * self.b1) * inv_det,
            a21: -self.a21 * inv_det,
            a22: self.a11 * inv_det,
            b2: (self.a21 * self.b1 - self.a11 * self.b2) * inv_det,
        })
    }

    /// 应用仿射变换到点 (x, y)
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let new_x = self.a11 * x + self.a12 * y + self.b1;
        let new_y = self.a21 * x + self.a22 * y + self.b2;
        (new_x, new_y)
    }

    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let (nx, ny) = self.apply(x as f64, y as f64);
        (nx as f32, ny as f32)
    }

    /// 映射矩形: 变换四个角点后取外接矩形
    pub fn map_rect(&self, bbox: &BBox) -> BBox {
        let corners = [
            self.apply(bbox.x1 as f64, bbox.y1 as f64),
            self.apply(bbox.x2 as f64, bbox.y1 as f64),
            self.apply(bbox.x1 as f64, bbox.y2 as f64),
            self.apply(bbox.x2 as f64, bbox.y2 as f64),
        ];
        let (mut x1, mut y1) = corners[0];
        let (mut x2, mut y2) = corners[0];
        for &(x, y) in &corners[1..] {
            x1 = x1.min(x);
            y1 = y1.min(y);
            x2 = x2.max(x);
            y2 = y2.max(y);
        }
        BBox::new(x1 as f32, y1 as f32, x2 as f32, y2 as f32)
    }

    /// 是否为纯缩放 (无旋转/错切/平移)
    pub fn is_pure_scale(&self) -> bool {
        self.a12 == 0.0 && self.a21 == 0.0 && self.b1 == 0.0 && self.b2 == 0.0
    }
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// 计算 源帧 → 目标裁剪图 的变换矩阵
///
/// # 参数
/// - `src_width`/`src_height`: 相机帧尺寸
/// - `dst_width`/`dst_height`: 检测器输入尺寸 (通常为正方形)
/// - `rotation_degrees`: 传感器相对屏幕的旋转角度 (90的整数倍)
/// - `maintain_aspect`: 保持宽高比 (按较大缩放系数填满目标,多余部分被裁掉)
pub fn get_transformation_matrix(
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
    rotation_degrees: i32,
    maintain_aspect: bool,
) -> Result<AffineMatrix, GeometryError> {
    if src_width == 0 || src_height == 0 {
        return Err(GeometryError::InvalidDimensions {
            width: src_width,
            height: src_height,
        });
    }
    if dst_width == 0 || dst_height == 0 {
        return Err(GeometryError::InvalidDimensions {
            width: dst_width,
            height: dst_height,
        });
    }

    let mut matrix = AffineMatrix::identity();

    if rotation_degrees != 0 {
        if rotation_degrees % 90 != 0 {
            log::warn!("⚠️  旋转角度 {} 不是90的整数倍", rotation_degrees);
        }
        // 平移到原点 → 绕原点旋转
        matrix = matrix
            .then(AffineMatrix::translation(
                -(src_width as f64) / 2.0,
                -(src_height as f64) / 2.0,
            ))
            .then(AffineMatrix::rotation(rotation_degrees as f64));
    }

    // 旋转90/270度时宽高互换
    let transpose = (rotation_degrees.abs() + 90) % 180 == 0;
    let (in_width, in_height) = if transpose {
        (src_height, src_width)
    } else {
        (src_width, src_height)
    };

    if in_width != dst_width || in_height != dst_height {
        let scale_x = dst_width as f64 / in_width as f64;
        let scale_y = dst_height as f64 / in_height as f64;
        matrix = if maintain_aspect {
            let scale = scale_x.max(scale_y);
            matrix.then(AffineMatrix::scale(scale, scale))
        } else {
            matrix.then(AffineMatrix::scale(scale_x, scale_y))
        };
    }

    if rotation_degrees != 0 {
        // 从原点中心坐标系平移回目标图像坐标系
        matrix = matrix.then(AffineMatrix::translation(
            dst_width as f64 / 2.0,
            dst_height as f64 / 2.0,
        ));
    }

    // 提前验证可逆性
    matrix.inverse()?;
    Ok(matrix)
}

/// 坐标映射器: 持有正向 (帧→裁剪) 与逆向 (裁剪→帧) 两个矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMapper {
    frame_to_crop: AffineMatrix,
    crop_to_frame: AffineMatrix,
    frame_size: (u32, u32),
    crop_size: (u32, u32),
    rotation: i32,
}

impl CoordinateMapper {
    pub fn new(
        frame_width: u32,
        frame_height: u32,
        crop_width: u32,
        crop_height: u32,
        rotation_degrees: i32,
        maintain_aspect: bool,
    ) -> Result<Self, GeometryError> {
        let frame_to_crop = get_transformation_matrix(
            frame_width,
            frame_height,
            crop_width,
            crop_height,
            rotation_degrees,
            maintain_aspect,
        )?;
        let crop_to_frame = frame_to_crop.inverse()?;
        Ok(Self {
            frame_to_crop,
            crop_to_frame,
            frame_size: (frame_width, frame_height),
            crop_size: (crop_width, crop_height),
            rotation: rotation_degrees,
        })
    }

    pub fn frame_to_crop(&self) -> &AffineMatrix {
        &self.frame_to_crop
    }

    pub fn crop_to_frame(&self) -> &AffineMatrix {
        &self.crop_to_frame
    }

    pub fn crop_size(&self) -> (u32, u32) {
        self.crop_size
    }

    /// 帧尺寸或旋转角度变化时需要重建
    pub fn matches(&self, frame_width: u32, frame_height: u32, rotation_degrees: i32) -> bool {
        self.frame_size == (frame_width, frame_height) && self.rotation == rotation_degrees
    }

    /// 裁剪图坐标 → 相机帧坐标
    pub fn to_frame(&self, bbox: &BBox) -> BBox {
        self.crop_to_frame.map_rect(bbox)
    }

    /// 相机帧坐标 → 裁剪图坐标
    pub fn to_crop(&self, bbox: &BBox) -> BBox {
        self.frame_to_crop.map_rect(bbox)
    }

    /// 生成检测器输入裁剪图
    pub fn crop(&self, frame: &RgbaImage) -> Result<RgbaImage, GeometryError> {
        warp_affine_rgba(frame, &self.frame_to_crop, self.crop_size.0, self.crop_size.1)
    }
}

/// 仿射变换函数 (RGBA图像, 最近邻插值, 越界填充透明黑)
///
/// # 参数
/// - `src`: 源图像
/// - `matrix`: 源 → 目标 的仿射矩阵
/// - `dst_width`/`dst_height`: 目标图像尺寸
pub fn warp_affine_rgba(
    src: &RgbaImage,
    matrix: &AffineMatrix,
    dst_width: u32,
    dst_height: u32,
) -> Result<RgbaImage, GeometryError> {
    if dst_width == 0 || dst_height == 0 {
        return Err(GeometryError::InvalidDimensions {
            width: dst_width,
            height: dst_height,
        });
    }

    // 纯缩放且恰好铺满目标: 走 fast_image_resize 快速路径
    if matrix.is_pure_scale() && covers_exactly(src, matrix, dst_width, dst_height) {
        match resize_nearest(src, dst_width, dst_height) {
            Ok(img) => return Ok(img),
            Err(e) => log::warn!("⚠️  快速缩放失败,回退到逐像素映射: {}", e),
        }
    }

    // 使用逆变换进行反向映射
    let inv_matrix = matrix.inverse()?;
    let (src_width, src_height) = src.dimensions();
    let mut dst = RgbaImage::new(dst_width, dst_height);

    for (dst_x, dst_y, pixel) in dst.enumerate_pixels_mut() {
        // 采样像素中心
        let (sx, sy) = inv_matrix.apply(dst_x as f64 + 0.5, dst_y as f64 + 0.5);
        let (sx, sy) = (sx.floor(), sy.floor());
        *pixel = if sx >= 0.0 && sy >= 0.0 && sx < src_width as f64 && sy < src_height as f64 {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgba([0, 0, 0, 0])
        };
    }

    Ok(dst)
}

fn covers_exactly(src: &RgbaImage, matrix: &AffineMatrix, dst_width: u32, dst_height: u32) -> bool {
    let (w, h) = src.dimensions();
    (matrix.a11 * w as f64 - dst_width as f64).abs() < 1e-6
        && (matrix.a22 * h as f64 - dst_height as f64).abs() < 1e-6
}

/// 最近邻缩放 (fast_image_resize)
fn resize_nearest(src: &RgbaImage, dst_width: u32, dst_height: u32) -> anyhow::Result<RgbaImage> {
    let (width, height) = src.dimensions();
    let src_image =
        fr::images::Image::from_vec_u8(width, height, src.as_raw().clone(), fr::PixelType::U8x4)?;
    let mut dst_image = fr::images::Image::new(dst_width, dst_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src_image,
        &mut dst_image,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest),
    )?;

    RgbaImage::from_raw(dst_width, dst_height, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("缩放结果缓冲区尺寸不符"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_close(a: (f64, f64), b: (f64, f64), tol: f64) {
        assert!(
            (a.0 - b.0).abs() <= tol && (a.1 - b.1).abs() <= tol,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_identity_transform() {
        let matrix = AffineMatrix::identity();
        let (x, y) = matrix.transform_point(10.0, 20.0);
        assert_eq!(x, 10.0);
        assert_eq!(y, 20.0);
    }

    #[test]
    fn test_rotation_90() {
        let matrix = AffineMatrix::rotation(90.0);
        assert_close(matrix.apply(1.0, 0.0), (0.0, 1.0), 1e-9);
    }

    #[test]
    fn test_inverse_of_translation() {
        let matrix = AffineMatrix::translation(5.0, 10.0);
        let inv = matrix.inverse().unwrap();
        let composed = matrix.compose(&inv);
        assert_eq!(composed, AffineMatrix::identity());
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let matrix = AffineMatrix::scale(0.0, 1.0);
        assert!(matches!(
            matrix.inverse(),
            Err(GeometryError::Singular { .. })
        ));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let err = get_transformation_matrix(0, 480, 300, 300, 90, false).unwrap_err();
        assert_eq!(
            err,
            GeometryError::InvalidDimensions {
                width: 0,
                height: 480
            }
        );
        assert!(CoordinateMapper::new(640, 480, 300, 0, 0, false).is_err());
    }

    #[test]
    fn unrotated_frame_scales_anisotropically() {
        let m = get_transformation_matrix(640, 480, 300, 300, 0, false).unwrap();
        assert!(m.is_pure_scale());
        assert_close(m.apply(640.0, 480.0), (300.0, 300.0), 1e-9);
    }

    #[test]
    fn rotated_frame_maps_corners_into_crop() {
        // 传感器旋转90度: 帧左上角落到裁剪图右上角
        let m = get_transformation_matrix(640, 480, 300, 300, 90, false).unwrap();
        assert_close(m.apply(0.0, 0.0), (300.0, 0.0), 1e-9);
        assert_close(m.apply(640.0, 480.0), (0.0, 300.0), 1e-9);
    }

    #[test]
    fn maintain_aspect_uses_larger_scale() {
        let m = get_transformation_matrix(640, 480, 300, 300, 0, true).unwrap();
        assert!((m.a11 - m.a22).abs() < 1e-12);
        assert!((m.a11 - 300.0 / 480.0).abs() < 1e-12);
    }

    #[test]
    fn rect_round_trip_through_mapper() {
        let mapper = CoordinateMapper::new(640, 480, 300, 300, 90, false).unwrap();
        let crop_box = BBox::new(30.0, 60.0, 120.0, 200.0);
        let frame_box = mapper.to_frame(&crop_box);
        let back = mapper.to_crop(&frame_box);
        assert!((back.x1 - crop_box.x1).abs() < 1e-3);
        assert!((back.y1 - crop_box.y1).abs() < 1e-3);
        assert!((back.x2 - crop_box.x2).abs() < 1e-3);
        assert!((back.y2 - crop_box.y2).abs() < 1e-3);
    }

    #[test]
    fn warp_fast_path_matches_dimensions() {
        let src = RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, 255]));
        let m = get_transformation_matrix(8, 4, 4, 4, 0, false).unwrap();
        let crop = warp_affine_rgba(&src, &m, 4, 4).unwrap();
        assert_eq!(crop.dimensions(), (4, 4));
        assert_eq!(*crop.get_pixel(3, 3), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn warp_rotated_moves_pixels() {
        // 2x1 图像: 左红右蓝, 顺时针旋转90度后上红下蓝
        let mut src = RgbaImage::new(2, 1);
        src.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        src.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        let m = get_transformation_matrix(2, 1, 1, 2, 90, false).unwrap();
        let crop = warp_affine_rgba(&src, &m, 1, 2).unwrap();
        assert_eq!(*crop.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*crop.get_pixel(0, 1), Rgba([0, 0, 255, 255]));
    }

    proptest! {
        #[test]
        fn forward_then_inverse_is_identity(
            width in 1u32..4096,
            height in 1u32..4096,
            rotation in prop::sample::select(vec![0i32, 90, 180, 270, -90, 45]),
            maintain_aspect in any::<bool>(),
            fx in 0.0f64..=1.0,
            fy in 0.0f64..=1.0,
        ) {
            let mapper = CoordinateMapper::new(width, height, 300, 300, rotation, maintain_aspect).unwrap();
            let p = (fx * width as f64, fy * height as f64);
            let (cx, cy) = mapper.frame_to_crop().apply(p.0, p.1);
            let back = mapper.crop_to_frame().apply(cx, cy);
            prop_assert!((back.0 - p.0).abs() <= 1e-3);
            prop_assert!((back.1 - p.1).abs() <= 1e-3);
        }
    }
}
