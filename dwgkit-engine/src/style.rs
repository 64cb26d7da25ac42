use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use dwgkit_config::HeuristicsConfig;
use dwgkit_core::document::{ColorSpec, DwgVersion, EntityKind, EntityStyle, Handle};
use dwgkit_source::{CircleRow, LayerColorRow, LineRow, RecordSource, StyleRow};
use tracing::{debug, info, warn};

const ACI_BLUE: u16 = 5;
const ACI_DEFAULT: u16 = 7;
const ACI_GRAY: u16 = 9;

const OVERRIDE_MIN_TOTAL_USAGE: usize = 40;
const OVERRIDE_MIN_DOMINANT_USAGE: usize = 16;

const AXIS_EPSILON: f64 = 1.0e-9;
const SUPPLEMENTARY_LINE_PERCENTILE: f64 = 0.75;
const SUPPLEMENTARY_CIRCLE_RATIO: (f64, f64) = (2.0, 4.0);

/// 图层颜色重映射：补偿某生产软件导出时把图层颜色写反的缺陷。
///
/// 仅在统计特征完全吻合时生成，属于启发式而非 DWG 格式语义。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerOverride {
    /// 使用量最大的灰色图层，改显示为蓝色。
    pub dominant_gray: Handle,
    /// 最小句柄的默认色图层，改显示为灰色。
    pub default_layer: Handle,
}

impl LayerOverride {
    pub fn color_for(&self, layer: Handle) -> Option<ColorSpec> {
        if layer == self.dominant_gray {
            Some(ColorSpec::aci(ACI_BLUE))
        } else if layer == self.default_layer {
            Some(ColorSpec::aci(ACI_GRAY))
        } else {
            None
        }
    }

    /// 被重映射为蓝色的图层，也是辅助线检测的来源图层。
    #[inline]
    pub fn source_layer(&self) -> Handle {
        self.dominant_gray
    }
}

/// 按图层使用量检测是否需要重映射。`style_layers` 为每个实体样式所在的图层，
/// `layers` 按记录源顺序给出图层颜色。
pub fn detect_layer_override(
    style_layers: impl IntoIterator<Item = Handle>,
    layers: &[(Handle, ColorSpec)],
) -> Option<LayerOverride> {
    let mut usage: HashMap<Handle, usize> = HashMap::new();
    for layer in style_layers {
        *usage.entry(layer).or_default() += 1;
    }
    if usage.is_empty() {
        return None;
    }
    let usage_of = |layer: Handle| usage.get(&layer).copied().unwrap_or(0);

    let mut dominant_gray: Option<Handle> = None;
    let mut missing_blue: Option<Handle> = None;
    let mut default_layer: Option<Handle> = None;
    for (layer, color) in layers {
        match color.normalized().index {
            Some(ACI_GRAY) => {
                if dominant_gray.is_none_or(|best| usage_of(*layer) > usage_of(best)) {
                    dominant_gray = Some(*layer);
                }
            }
            Some(ACI_BLUE) => {
                if missing_blue.is_none_or(|best| usage_of(*layer) < usage_of(best)) {
                    missing_blue = Some(*layer);
                }
            }
            Some(ACI_DEFAULT) => {
                if default_layer.is_none_or(|best| *layer < best) {
                    default_layer = Some(*layer);
                }
            }
            _ => {}
        }
    }
    let (dominant_gray, missing_blue, default_layer) =
        (dominant_gray?, missing_blue?, default_layer?);

    let total: usize = usage.values().sum();
    let dominant_usage = usage_of(dominant_gray);
    if total < OVERRIDE_MIN_TOTAL_USAGE
        || dominant_usage < OVERRIDE_MIN_DOMINANT_USAGE.max(total.div_ceil(3))
        || usage_of(missing_blue) != 0
        || usage_of(default_layer) == 0
    {
        return None;
    }

    Some(LayerOverride {
        dominant_gray,
        default_layer,
    })
}

/// 线性插值百分位数，`p` 取 [0, 1]。
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let position = p * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = position - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// 文档级颜色解析：实体样式、图层颜色与启发式覆盖。
#[derive(Debug, Clone, Default)]
pub struct StyleResolver {
    styles: HashMap<Handle, StyleRow>,
    layers: HashMap<Handle, ColorSpec>,
    layer_order: Vec<Handle>,
    layer_override: Option<LayerOverride>,
    supplementary: bool,
}

impl StyleResolver {
    pub fn new(styles: Vec<StyleRow>, layers: Vec<LayerColorRow>) -> Self {
        let mut resolver = Self::default();
        for style in styles {
            resolver.styles.insert(style.handle, style);
        }
        for layer in layers {
            let color = ColorSpec::new(Some(layer.color_index), layer.true_color);
            if resolver.layers.insert(layer.handle, color).is_none() {
                resolver.layer_order.push(layer.handle);
            }
        }
        resolver
    }

    /// 按配置与文件版本决定是否启用图层重映射与辅助线着色。
    pub fn with_heuristics(mut self, version: DwgVersion, heuristics: &HeuristicsConfig) -> Self {
        self.supplementary = heuristics.supplementary_colors;
        let version_matches = heuristics
            .override_versions
            .iter()
            .any(|code| code.trim().eq_ignore_ascii_case(version.code()));
        if !heuristics.layer_color_override || !version_matches {
            self.layer_override = None;
            return self;
        }

        let layers: Vec<(Handle, ColorSpec)> = self
            .layer_order
            .iter()
            .filter_map(|handle| self.layers.get(handle).map(|color| (*handle, *color)))
            .collect();
        self.layer_override =
            detect_layer_override(self.styles.values().map(|style| style.layer_handle), &layers);
        if let Some(layer_override) = self.layer_override {
            info!(
                version = %version,
                dominant_gray = %layer_override.dominant_gray,
                default_layer = %layer_override.default_layer,
                "检测到图层颜色导出缺陷，启用重映射"
            );
        }
        self
    }

    /// 样式或图层数据不可用时分别按空表处理。
    pub fn from_source<S: RecordSource + ?Sized>(source: &S, heuristics: &HeuristicsConfig) -> Self {
        let styles = source.entity_styles().unwrap_or_else(|err| {
            warn!(error = %err, "实体样式不可用，颜色保持缺省");
            Vec::new()
        });
        let layers = source.layer_colors().unwrap_or_else(|err| {
            warn!(error = %err, "图层颜色不可用，ByLayer 颜色无法继承");
            Vec::new()
        });
        debug!(styles = styles.len(), layers = layers.len(), "已载入颜色数据");
        Self::new(styles, layers).with_heuristics(source.version(), heuristics)
    }

    #[inline]
    pub fn layer_override(&self) -> Option<LayerOverride> {
        self.layer_override
    }

    /// 图层的有效颜色（考虑重映射）。
    pub fn layer_color(&self, layer: Handle) -> Option<ColorSpec> {
        self.layer_override
            .and_then(|layer_override| layer_override.color_for(layer))
            .or_else(|| self.layers.get(&layer).copied())
    }

    pub fn layer_of(&self, handle: Handle) -> Option<Handle> {
        self.styles.get(&handle).map(|style| style.layer_handle)
    }

    /// 解析实体颜色：自身颜色为 ByLayer 哨兵时继承图层颜色，最后做真彩色兼容处理。
    pub fn resolve(&self, handle: Handle, kind: EntityKind) -> EntityStyle {
        let mut style = EntityStyle::default();
        let mut resolved = ColorSpec::default();

        if let Some(row) = self.styles.get(&handle) {
            let own = ColorSpec::new(row.color_index, row.true_color);
            style.color_index = row.color_index;
            style.true_color = row.true_color;
            style.layer_handle = Some(row.layer_handle);
            resolved = own;
            if own.is_by_layer() {
                if let Some(layer_color) = self.layer_color(row.layer_handle) {
                    resolved = layer_color;
                }
            }
        }

        // 同一导出缺陷下，默认图层上的圆弧应显示为来源图层的颜色
        if kind == EntityKind::Arc {
            if let Some(layer_override) = self.layer_override {
                if style.layer_handle == Some(layer_override.default_layer) {
                    resolved = ColorSpec::aci(ACI_BLUE);
                }
            }
        }

        let resolved = resolved.normalized();
        style.resolved_color_index = resolved.index;
        style.resolved_true_color = resolved.true_color;
        style
    }

    /// 把样式标记为灰色辅助线，只影响显示颜色。
    pub fn mark_supplementary(style: &mut EntityStyle) {
        style.resolved_color_index = Some(ACI_GRAY);
        style.resolved_true_color = None;
        style.supplementary = true;
    }

    fn on_source_layer(&self, handle: Handle) -> Option<Handle> {
        let source_layer = self.layer_override?.source_layer();
        (self.layer_of(handle)? == source_layer).then_some(source_layer)
    }

    /// 来源图层上端点互不共享、轴向且长度不低于 75 百分位的直线。
    pub fn supplementary_lines(&self, rows: &[LineRow]) -> HashSet<Handle> {
        if !self.supplementary || self.layer_override.is_none() {
            return HashSet::new();
        }

        let candidates: Vec<&LineRow> = rows
            .iter()
            .filter(|row| self.on_source_layer(row.handle).is_some())
            .collect();
        let mut endpoint_usage: HashMap<(i64, i64, i64), usize> = HashMap::new();
        for row in &candidates {
            *endpoint_usage.entry(row.start.snap_key()).or_default() += 1;
            *endpoint_usage.entry(row.end.snap_key()).or_default() += 1;
        }

        let isolated_axis_lengths: Vec<(Handle, f64)> = candidates
            .iter()
            .filter(|row| {
                endpoint_usage.get(&row.start.snap_key()) == Some(&1)
                    && endpoint_usage.get(&row.end.snap_key()) == Some(&1)
            })
            .filter_map(|row| {
                let delta = row.start.vector_to(row.end);
                let diagonal = delta.x().abs() > AXIS_EPSILON && delta.y().abs() > AXIS_EPSILON;
                (!diagonal).then(|| (row.handle, delta.planar_length()))
            })
            .collect();
        if isolated_axis_lengths.is_empty() {
            return HashSet::new();
        }

        let lengths: Vec<f64> = isolated_axis_lengths.iter().map(|(_, length)| *length).collect();
        let threshold = percentile(&lengths, SUPPLEMENTARY_LINE_PERCENTILE);
        let flagged: HashSet<Handle> = isolated_axis_lengths
            .into_iter()
            .filter(|(_, length)| length + AXIS_EPSILON >= threshold)
            .map(|(handle, _)| handle)
            .collect();
        debug!(count = flagged.len(), threshold, "辅助直线检测完成");
        flagged
    }

    /// 来源图层上同心圆组中，半径为次大者 2 到 4 倍的最大圆。
    pub fn supplementary_circles(&self, rows: &[CircleRow]) -> HashSet<Handle> {
        if !self.supplementary || self.layer_override.is_none() {
            return HashSet::new();
        }

        let mut by_center: HashMap<(i64, i64, i64), Vec<(Handle, f64)>> = HashMap::new();
        for row in rows {
            if self.on_source_layer(row.handle).is_some() {
                by_center
                    .entry(row.center.snap_key())
                    .or_default()
                    .push((row.handle, row.radius));
            }
        }

        let (min_ratio, max_ratio) = SUPPLEMENTARY_CIRCLE_RATIO;
        let mut flagged = HashSet::new();
        for mut group in by_center.into_values() {
            if group.len() < 2 {
                continue;
            }
            group.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            let (largest, largest_radius) = group[0];
            let second_radius = group[1].1;
            if second_radius <= 0.0 {
                continue;
            }
            let ratio = largest_radius / second_radius;
            if (min_ratio..=max_ratio).contains(&ratio) {
                flagged.insert(largest);
            }
        }
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwgkit_core::geometry::Point3;

    const GRAY_LAYER: u64 = 0x10;
    const BLUE_LAYER: u64 = 0x11;
    const DEFAULT_LAYER: u64 = 0x12;
    const RED_LAYER: u64 = 0x13;

    fn style(handle: u64, index: Option<u16>, true_color: Option<u32>, layer: u64) -> StyleRow {
        StyleRow {
            handle: Handle::new(handle),
            color_index: index,
            true_color,
            layer_handle: Handle::new(layer),
        }
    }

    fn layer(handle: u64, index: u16) -> LayerColorRow {
        LayerColorRow {
            handle: Handle::new(handle),
            color_index: index,
            true_color: None,
        }
    }

    fn standard_layers() -> Vec<LayerColorRow> {
        vec![
            layer(GRAY_LAYER, 9),
            layer(BLUE_LAYER, 5),
            layer(DEFAULT_LAYER, 7),
            layer(RED_LAYER, 1),
        ]
    }

    /// 30 个实体在灰色图层、12 个在默认图层、蓝色图层无实体。
    fn defective_styles() -> Vec<StyleRow> {
        let mut styles = Vec::new();
        for handle in 0x100..0x100 + 30 {
            styles.push(style(handle, Some(256), None, GRAY_LAYER));
        }
        for handle in 0x200..0x200 + 12 {
            styles.push(style(handle, Some(256), None, DEFAULT_LAYER));
        }
        styles
    }

    fn heuristics() -> HeuristicsConfig {
        HeuristicsConfig::default()
    }

    #[test]
    fn by_layer_entities_inherit_layer_color() {
        let resolver = StyleResolver::new(
            vec![
                style(1, Some(256), None, RED_LAYER),
                style(2, Some(3), None, RED_LAYER),
                style(3, None, Some(0x00_80_40_20), RED_LAYER),
                style(4, Some(0), Some(5), RED_LAYER),
            ],
            standard_layers(),
        );

        let inherited = resolver.resolve(Handle::new(1), EntityKind::Line);
        assert_eq!(inherited.resolved(), ColorSpec::aci(1));
        assert_eq!(inherited.layer_handle, Some(Handle::new(RED_LAYER)));

        let own = resolver.resolve(Handle::new(2), EntityKind::Line);
        assert_eq!(own.resolved(), ColorSpec::aci(3));

        let rgb = resolver.resolve(Handle::new(3), EntityKind::Line);
        assert_eq!(rgb.resolved(), ColorSpec::new(None, Some(0x00_80_40_20)));

        // 真彩色落在 ACI 范围且索引为哨兵：按索引解释
        let quirk = resolver.resolve(Handle::new(4), EntityKind::Line);
        assert_eq!(quirk.resolved(), ColorSpec::aci(5));
    }

    #[test]
    fn entity_without_style_stays_unresolved() {
        let resolver = StyleResolver::new(vec![], standard_layers());
        let style = resolver.resolve(Handle::new(0x77), EntityKind::Circle);
        assert_eq!(style, EntityStyle::default());
    }

    #[test]
    fn override_fires_on_exact_statistics() {
        let resolver = StyleResolver::new(defective_styles(), standard_layers())
            .with_heuristics(DwgVersion::R2018, &heuristics());
        let layer_override = resolver.layer_override().expect("override detected");
        assert_eq!(layer_override.dominant_gray, Handle::new(GRAY_LAYER));
        assert_eq!(layer_override.default_layer, Handle::new(DEFAULT_LAYER));

        let on_gray = resolver.resolve(Handle::new(0x100), EntityKind::Line);
        assert_eq!(on_gray.resolved(), ColorSpec::aci(5));
        let on_default = resolver.resolve(Handle::new(0x200), EntityKind::Line);
        assert_eq!(on_default.resolved(), ColorSpec::aci(9));
        let arc_on_default = resolver.resolve(Handle::new(0x200), EntityKind::Arc);
        assert_eq!(arc_on_default.resolved(), ColorSpec::aci(5));
    }

    #[test]
    fn override_requires_listed_version() {
        let resolver = StyleResolver::new(defective_styles(), standard_layers())
            .with_heuristics(DwgVersion::R2000, &heuristics());
        assert!(resolver.layer_override().is_none());

        let disabled = HeuristicsConfig {
            layer_color_override: false,
            ..HeuristicsConfig::default()
        };
        let resolver = StyleResolver::new(defective_styles(), standard_layers())
            .with_heuristics(DwgVersion::R2018, &disabled);
        assert!(resolver.layer_override().is_none());
    }

    #[test]
    fn override_rejects_near_miss_statistics() {
        // 总量不足 40
        let few: Vec<StyleRow> = defective_styles().into_iter().take(39).collect();
        let layers: Vec<(Handle, ColorSpec)> = standard_layers()
            .into_iter()
            .map(|row| (row.handle, ColorSpec::aci(row.color_index)))
            .collect();
        assert!(detect_layer_override(few.iter().map(|s| s.layer_handle), &layers).is_none());

        // 蓝色图层已被使用
        let mut used_blue = defective_styles();
        used_blue.push(style(0x300, Some(256), None, BLUE_LAYER));
        assert!(
            detect_layer_override(used_blue.iter().map(|s| s.layer_handle), &layers).is_none()
        );

        // 默认图层未被使用
        let mut no_default: Vec<StyleRow> = defective_styles()
            .into_iter()
            .filter(|s| s.layer_handle != Handle::new(DEFAULT_LAYER))
            .collect();
        for handle in 0x400..0x400 + 12 {
            no_default.push(style(handle, Some(256), None, RED_LAYER));
        }
        assert!(
            detect_layer_override(no_default.iter().map(|s| s.layer_handle), &layers).is_none()
        );

        // 灰色图层不占主导
        let mut diluted = defective_styles();
        for handle in 0x500..0x500 + 60 {
            diluted.push(style(handle, Some(1), None, RED_LAYER));
        }
        assert!(detect_layer_override(diluted.iter().map(|s| s.layer_handle), &layers).is_none());
    }

    #[test]
    fn dominant_share_rounds_up() {
        let layers: Vec<(Handle, ColorSpec)> = standard_layers()
            .into_iter()
            .map(|row| (row.handle, ColorSpec::aci(row.color_index)))
            .collect();
        let usage = |gray: usize, default: usize| {
            std::iter::repeat_n(Handle::new(GRAY_LAYER), gray)
                .chain(std::iter::repeat_n(Handle::new(DEFAULT_LAYER), default))
                .collect::<Vec<_>>()
        };

        // 总量 49，⌈49/3⌉ = 17
        assert!(detect_layer_override(usage(16, 33), &layers).is_none());
        let fired = detect_layer_override(usage(17, 32), &layers).expect("override at 17/49");
        assert_eq!(fired.dominant_gray, Handle::new(GRAY_LAYER));
        assert_eq!(fired.default_layer, Handle::new(DEFAULT_LAYER));
    }

    #[test]
    fn percentile_interpolates_linearly() {
        assert_eq!(percentile(&[], 0.75), 0.0);
        assert_eq!(percentile(&[4.0], 0.75), 4.0);
        assert!((percentile(&[1.0, 2.0, 3.0, 4.0], 0.75) - 3.25).abs() < 1e-12);
        assert!((percentile(&[5.0, 1.0, 3.0], 0.5) - 3.0).abs() < 1e-12);
    }

    fn line(handle: u64, start: (f64, f64), end: (f64, f64)) -> LineRow {
        LineRow {
            handle: Handle::new(handle),
            start: Point3::new(start.0, start.1, 0.0),
            end: Point3::new(end.0, end.1, 0.0),
        }
    }

    #[test]
    fn long_isolated_axis_lines_are_supplementary() {
        let resolver = StyleResolver::new(defective_styles(), standard_layers())
            .with_heuristics(DwgVersion::R2013, &heuristics());
        let rows = vec![
            line(0x100, (0.0, 0.0), (1.0, 0.0)),
            line(0x101, (0.0, 5.0), (2.0, 5.0)),
            line(0x102, (0.0, 10.0), (0.0, 13.0)),
            line(0x103, (20.0, 0.0), (20.0, 40.0)),
            // 对角线不参与
            line(0x104, (50.0, 50.0), (90.0, 90.0)),
            // 与 0x106 共用端点
            line(0x105, (100.0, 0.0), (200.0, 0.0)),
            line(0x106, (200.0, 0.0), (200.0, 100.0)),
            // 默认图层上的直线不参与
            line(0x200, (300.0, 0.0), (900.0, 0.0)),
        ];
        let flagged = resolver.supplementary_lines(&rows);
        assert_eq!(flagged, HashSet::from([Handle::new(0x103)]));
    }

    #[test]
    fn largest_concentric_circle_in_ratio_is_supplementary() {
        let resolver = StyleResolver::new(defective_styles(), standard_layers())
            .with_heuristics(DwgVersion::R2010, &heuristics());
        let circle = |handle: u64, x: f64, radius: f64| CircleRow {
            handle: Handle::new(handle),
            center: Point3::new(x, 0.0, 0.0),
            radius,
        };
        let rows = vec![
            circle(0x100, 0.0, 1.0),
            circle(0x101, 0.0, 3.0),
            circle(0x102, 10.0, 1.0),
            circle(0x103, 10.0, 5.0),
            circle(0x104, 20.0, 2.0),
        ];
        let flagged = resolver.supplementary_circles(&rows);
        assert_eq!(flagged, HashSet::from([Handle::new(0x101)]));
    }

    #[test]
    fn supplementary_detection_needs_override() {
        let resolver = StyleResolver::new(defective_styles(), standard_layers());
        let rows = vec![line(0x100, (0.0, 0.0), (10.0, 0.0))];
        assert!(resolver.supplementary_lines(&rows).is_empty());
    }
}
