use std::path::Path;

use console::Style;

use aligner_core::channel::ChannelStack;
use aligner_core::io::metadata::tag_name;
use aligner_core::io::ResolutionUnit;
use aligner_core::levels::infer_bit_depth_range;
use aligner_core::session::AlignSession;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(title.chars().count())));
    println!();
}

pub fn print_stack_summary(stack: &ChannelStack) {
    let s = Styles::new();
    print_title(&s, "Channel Stack");

    for path in &stack.source_paths {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Input"),
            s.path.apply_to(path.display())
        );
    }
    if let Some((w, h)) = stack.dimensions() {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Dimensions"),
            s.value.apply_to(format!("{w}x{h}"))
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Channels"),
        s.value.apply_to(stack.len())
    );
    println!();

    println!("  {}", s.header.apply_to("Channels"));
    for (i, channel) in stack.channels.iter().enumerate() {
        let (lo, hi) = infer_bit_depth_range(channel);
        let range = match channel.extrema() {
            Some((min, max)) => format!("{min}..{max}"),
            None => "empty".to_string(),
        };
        println!(
            "    {:<12}{}  {}  {}",
            s.label.apply_to(format!("C{}", i + 1)),
            s.method.apply_to(channel.format),
            s.value.apply_to(range),
            s.label.apply_to(format!("(nominal {lo}..{hi})"))
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Save Options"));
    let options = &stack.save_options;
    println!(
        "    {:<12}{}",
        s.label.apply_to("Compression"),
        s.value.apply_to(options.compression)
    );
    match options.resolution.and_then(|r| r.as_f64().map(|xy| (xy, r.unit))) {
        Some(((x, y), unit)) => {
            let unit = match unit {
                ResolutionUnit::None => "",
                ResolutionUnit::Inch => " per inch",
                ResolutionUnit::Centimeter => " per cm",
            };
            println!(
                "    {:<12}{}",
                s.label.apply_to("Resolution"),
                s.value.apply_to(format!("{x} x {y}{unit}"))
            );
        }
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Resolution"),
            s.disabled.apply_to("none")
        ),
    }
    match &options.icc_profile {
        Some(icc) => println!(
            "    {:<12}{}",
            s.label.apply_to("ICC"),
            s.value.apply_to(format!("{} bytes", icc.len()))
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("ICC"),
            s.disabled.apply_to("none")
        ),
    }
    println!();

    match &stack.metadata {
        Some(metadata) => {
            println!("  {}", s.header.apply_to("Metadata"));
            for (tag, value) in metadata.iter() {
                let name = tag_name(tag).map_or_else(|| format!("Tag {tag}"), str::to_string);
                println!("    {:<18}{}", s.label.apply_to(name), s.value.apply_to(value));
            }
        }
        None => println!(
            "  {:<14}{}",
            s.header.apply_to("Metadata"),
            s.disabled.apply_to("none")
        ),
    }
    println!();
}

pub fn print_alignment_summary(session: &AlignSession, output: &Path) {
    let s = Styles::new();
    print_title(&s, "Aligned Stack");

    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Resample"),
        s.method.apply_to(session.resample())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Reference"),
        s.value.apply_to(format!("C{}", session.reference() + 1))
    );
    println!();

    println!("  {}", s.header.apply_to("Transforms"));
    for (i, state) in session.transforms().iter().enumerate() {
        let label = s.label.apply_to(format!("C{}", i + 1));
        if i == session.reference() {
            println!("    {:<12}{}", label, s.disabled.apply_to("reference"));
        } else if state.is_identity() {
            println!("    {:<12}{}", label, s.disabled.apply_to("unchanged"));
        } else {
            println!(
                "    {:<12}{}",
                label,
                s.value.apply_to(format!(
                    "dx={:.2} dy={:.2} angle={:.2} deg",
                    state.dx, state.dy, state.angle_deg
                ))
            );
        }
    }
    println!();
}
