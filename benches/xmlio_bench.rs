use std::fmt::Write as _;
use std::hint::black_box;
use std::time::Instant;

use mu_xmlio::xml::{Attribute, SaxError};
use mu_xmlio::{
    BuildError, ContentHandler, EventType, Formatter, Parser, SaxParser, StaxEventFormatter,
    StaxEventParser, StaxStreamFormatter, StaxStreamParser, XmlEvent, XmlEventWriter,
    XmlStreamWriter,
};

#[derive(Clone, Copy)]
struct Fixture {
    key: &'static str,
    items: usize,
}

const FIXTURES: &[Fixture] = &[
    Fixture {
        key: "catalog-10",
        items: 10,
    },
    Fixture {
        key: "catalog-1k",
        items: 1_000,
    },
    Fixture {
        key: "catalog-20k",
        items: 20_000,
    },
];

const WARMUP_ITERS: usize = 2;
const MEASURE_ITERS: usize = 10;

#[derive(Clone, Debug)]
struct CaseResult {
    fixture: String,
    case: String,
    iterations: usize,
    min: u128,
    median: u128,
    p90: u128,
    mean: u128,
    max: u128,
}

#[derive(Clone, Debug)]
struct Item {
    id: usize,
    title: String,
    price: String,
}

fn items(count: usize) -> Vec<Item> {
    (0..count)
        .map(|id| Item {
            id,
            title: format!("Item <{}> & friends", id),
            price: format!("{}.{:02}", id / 100, id % 100),
        })
        .collect()
}

fn catalog_xml(items: &[Item]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<catalog>\n");
    for item in items {
        let _ = writeln!(
            xml,
            "  <item id=\"{}\"><title>{}</title><price>{}</price></item>",
            item.id,
            item.title.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;"),
            item.price
        );
    }
    xml.push_str("</catalog>\n");
    xml
}

#[derive(Default)]
struct ElementCount(usize);

impl ContentHandler for ElementCount {
    fn start_element(&mut self, _name: &str, _attributes: &[Attribute]) -> Result<(), SaxError> {
        self.0 += 1;
        Ok(())
    }
}

fn percentile(sorted: &[u128], percentile: f64) -> u128 {
    let idx = ((sorted.len().saturating_sub(1) as f64) * percentile).round() as usize;
    sorted[idx]
}

fn run_case<F>(fixture: &str, case: &str, mut op: F) -> CaseResult
where
    F: FnMut() -> usize,
{
    for _ in 0..WARMUP_ITERS {
        black_box(op());
    }

    let mut samples = Vec::with_capacity(MEASURE_ITERS);
    for _ in 0..MEASURE_ITERS {
        let start = Instant::now();
        black_box(op());
        samples.push(start.elapsed().as_nanos());
    }

    samples.sort_unstable();
    let sum: u128 = samples.iter().copied().sum();
    CaseResult {
        fixture: fixture.to_string(),
        case: case.to_string(),
        iterations: MEASURE_ITERS,
        min: samples[0],
        median: percentile(&samples, 0.5),
        p90: percentile(&samples, 0.9),
        mean: sum / samples.len() as u128,
        max: samples[samples.len() - 1],
    }
}

fn main() {
    println!("# mu-xmlio benchmark corpus");
    println!(
        "# warmup_iters={}, measure_iters={}",
        WARMUP_ITERS, MEASURE_ITERS
    );
    println!("# fixture_count={}", FIXTURES.len());
    println!("fixture,case,iterations,min_ns,median_ns,p90_ns,mean_ns,max_ns");

    let sax = SaxParser::per_call(ElementCount::default, |count: &mut ElementCount| {
        Ok::<_, BuildError>(count.0)
    });
    let stax_stream = StaxStreamParser::new(|reader| {
        let mut count = 0;
        while reader.has_next() {
            if reader.next()? == EventType::StartElement {
                count += 1;
            }
        }
        Ok(count)
    });
    let stax_event = StaxEventParser::new(|reader| {
        let mut count = 0;
        for event in reader {
            if event?.is_start_element() {
                count += 1;
            }
        }
        Ok(count)
    });
    let stream_formatter =
        StaxStreamFormatter::new(|items: &[Item], w: &mut XmlStreamWriter<'_>| {
            w.write_start_document()?;
            w.write_start_element("catalog")?;
            for item in items {
                w.write_start_element("item")?;
                w.write_attribute("id", &item.id.to_string())?;
                w.write_start_element("title")?;
                w.write_characters(&item.title)?;
                w.write_end_element()?;
                w.write_start_element("price")?;
                w.write_characters(&item.price)?;
                w.write_end_element()?;
                w.write_end_element()?;
            }
            w.write_end_document()?;
            Ok(())
        });
    let event_formatter =
        StaxEventFormatter::new(|items: &[Item], w: &mut XmlEventWriter<'_>| {
            w.add(&XmlEvent::start_element("catalog"))?;
            for item in items {
                w.add(&XmlEvent::StartElement {
                    name: "item".to_string(),
                    attributes: vec![Attribute::new("id", item.id.to_string())],
                })?;
                w.add(&XmlEvent::start_element("title"))?;
                w.add(&XmlEvent::characters(item.title.as_str()))?;
                w.add(&XmlEvent::end_element("title"))?;
                w.add(&XmlEvent::end_element("item"))?;
            }
            w.add(&XmlEvent::end_element("catalog"))?;
            Ok(())
        });

    let mut results: Vec<CaseResult> = Vec::new();

    for fixture in FIXTURES {
        let items = items(fixture.items);
        let xml = catalog_xml(&items);

        results.push(run_case(fixture.key, "parse/sax", || {
            sax.parse_str(&xml).expect("sax parse failed")
        }));

        results.push(run_case(fixture.key, "parse/stax-stream", || {
            stax_stream.parse_str(&xml).expect("stream parse failed")
        }));

        results.push(run_case(fixture.key, "parse/stax-event", || {
            stax_event.parse_str(&xml).expect("event parse failed")
        }));

        results.push(run_case(fixture.key, "compare/roxmltree/parse", || {
            let doc = roxmltree::Document::parse(&xml).expect("roxmltree parse failed");
            doc.descendants().filter(|n| n.is_element()).count()
        }));

        results.push(run_case(fixture.key, "format/stax-stream", || {
            let mut out = Vec::with_capacity(xml.len());
            stream_formatter
                .format_stream(&items[..], &mut out)
                .expect("stream format failed");
            out.len()
        }));

        results.push(run_case(fixture.key, "format/stax-event", || {
            let mut out = Vec::with_capacity(xml.len());
            event_formatter
                .format_stream(&items[..], &mut out)
                .expect("event format failed");
            out.len()
        }));
    }

    for result in &results {
        println!(
            "{},{},{},{},{},{},{},{}",
            result.fixture,
            result.case,
            result.iterations,
            result.min,
            result.median,
            result.p90,
            result.mean,
            result.max
        );
    }

    println!("# summary");
    println!("fixture,metric,mu-xmlio_median_ns,roxmltree_median_ns,ratio_x");

    let find_median = |fixture: &str, case: &str| -> u128 {
        results
            .iter()
            .find(|r| r.fixture == fixture && r.case == case)
            .unwrap_or_else(|| panic!("missing case in results: fixture={} case={}", fixture, case))
            .median
    };

    for fixture in FIXTURES {
        let other = find_median(fixture.key, "compare/roxmltree/parse");
        for case in ["parse/sax", "parse/stax-stream", "parse/stax-event"] {
            let ours = find_median(fixture.key, case);
            let ratio = ours as f64 / other.max(1) as f64;
            println!("{},{},{},{},{:.2}", fixture.key, case, ours, other, ratio);
        }
    }
}
